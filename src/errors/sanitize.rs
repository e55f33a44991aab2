//! Removal of sensitive keys from error context.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Terms that mark a context key as sensitive wherever they appear in it.
/// Keys are lowercased and stripped of separators before matching, so
/// `userPassword`, `graph_access_token` and `x-client-secret` all match.
static SENSITIVE_TERM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"password|passwd|pwd|token|secret|apikey|authorization|cookie|privatekey|credential")
        .expect("sensitive term pattern is valid")
});

/// Normalized keys that contain a sensitive term but carry no secret.
static ALLOWED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^tokeni[sz]ers?$").expect("allowed key pattern is valid"));

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Whether a context key must be stripped.
pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = normalize_key(key);
    SENSITIVE_TERM.is_match(&normalized) && !ALLOWED_KEY.is_match(&normalized)
}

/// Strip sensitive keys, descending into nested objects and arrays.
pub fn sanitize_context(context: Map<String, Value>) -> Map<String, Value> {
    context
        .into_iter()
        .filter(|(key, _)| !is_sensitive_key(key))
        .map(|(key, value)| (key, sanitize_value(value)))
        .collect()
}

fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_context(map)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_strips_password_keeps_user() {
        let out = sanitize_context(obj(json!({"user": "a", "password": "s3cret"})));
        assert_eq!(out.get("user"), Some(&json!("a")));
        assert!(!out.contains_key("password"));
    }

    #[test]
    fn test_case_and_separator_variants() {
        let out = sanitize_context(obj(json!({
            "Access_Token": "x",
            "refresh-token": "y",
            "CLIENTSECRET": "z",
            "apiKey": "k",
            "Authorization": "Bearer q",
            "tokenizer": "kept",
        })));
        assert_eq!(out.len(), 1);
        assert!(out.contains_key("tokenizer"));
    }

    #[test]
    fn test_compound_keys() {
        let out = sanitize_context(obj(json!({
            "userPassword": "p",
            "graphAccessToken": "t",
            "x-client-secret": "s",
            "Proxy-Authorization": "Basic q",
            "session.cookie": "c",
            "user": "a",
        })));
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["user"]);
    }

    #[test]
    fn test_nested_values() {
        let out = sanitize_context(obj(json!({
            "request": {"url": "/me", "headers": {"authorization": "Bearer t"}},
            "attempts": [{"token": "t", "n": 1}],
        })));
        assert_eq!(out["request"], json!({"url": "/me", "headers": {}}));
        assert_eq!(out["attempts"], json!([{"n": 1}]));
    }
}
