//! Microsoft Graph client: the HTTP collaborator behind the built-in modules.
//!
//! Implements [`GraphClient`] against the Graph REST surface for mail,
//! calendar, people and OneDrive files. Payloads come back as raw JSON; the
//! modules decide how to shape them. No retries: a failed call surfaces as a
//! [`CollaboratorError`] and the dispatch protocol reports it.
//!
//! ## Configuration
//!
//! ```yaml
//! graph:
//!   base_url: "https://graph.microsoft.com/v1.0"
//!   tenant_id: "${AZURE_TENANT_ID}"
//!   client_id: "${AZURE_CLIENT_ID}"
//!   client_secret: "${AZURE_CLIENT_SECRET}"
//!   scopes:
//!     - "https://graph.microsoft.com/.default"
//! ```
//!
//! A static `access_token` takes precedence over client credentials.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::config::GraphConfig;

use super::super::adapter::{CollaboratorError, GraphClient, GraphOperation, TimeRange};

enum Credentials {
    Static(String),
    ClientCredentials {
        tenant_id: String,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
    },
}

/// Upper bound on a token's advertised lifetime.
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Microsoft Graph REST client.
pub struct GraphApiClient {
    base_url: Url,
    login_url: String,
    http: reqwest::Client,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl GraphApiClient {
    /// Build a client from the `graph` config section.
    pub fn from_config(config: &GraphConfig) -> Result<Self, CollaboratorError> {
        let credentials = match (
            config.access_token.as_deref(),
            config.tenant_id.as_deref(),
            config.client_id.as_deref(),
            config.client_secret.as_deref(),
        ) {
            (Some(token), _, _, _) if !token.is_empty() => Credentials::Static(token.to_string()),
            (_, Some(tenant), Some(client), Some(secret))
                if !tenant.is_empty() && !client.is_empty() && !secret.is_empty() =>
            {
                Credentials::ClientCredentials {
                    tenant_id: tenant.to_string(),
                    client_id: client.to_string(),
                    client_secret: secret.to_string(),
                    scopes: config.scopes.clone(),
                }
            }
            _ => {
                return Err(CollaboratorError::InvalidConfig(
                    "graph requires either access_token or tenant_id/client_id/client_secret"
                        .to_string(),
                ))
            }
        };

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            CollaboratorError::InvalidConfig(format!("invalid graph base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CollaboratorError::InvalidConfig(format!(
                "graph base_url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(Self {
            base_url,
            login_url: "https://login.microsoftonline.com".to_string(),
            http,
            credentials,
            token: Mutex::new(None),
        })
    }

    /// Path segments for a principal: `me` or `users/{id}`.
    fn user_segments(user: &str) -> Vec<&str> {
        if user.is_empty() || user.eq_ignore_ascii_case("me") {
            vec!["me"]
        } else {
            vec!["users", user]
        }
    }

    /// Full request URL from raw path segments.
    ///
    /// Each segment is percent-encoded on its own (`/`, `?`, `#` and `%`
    /// included), so caller-supplied ids can never add or climb path levels.
    /// Empty and dot segments are rejected.
    fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url, CollaboratorError> {
        if let Some(bad) = segments
            .iter()
            .map(|s| AsRef::<str>::as_ref(s))
            .find(|s| s.is_empty() || *s == "." || *s == "..")
        {
            return Err(CollaboratorError::InvalidRequest(format!(
                "invalid path segment '{}'",
                bad
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CollaboratorError::InvalidConfig("graph base_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments.iter().map(|s| AsRef::<str>::as_ref(s)));
        Ok(url)
    }

    /// `{user}/{rest...}` as a URL.
    fn user_endpoint(&self, user: &str, rest: &[&str]) -> Result<Url, CollaboratorError> {
        let mut segments = Self::user_segments(user);
        segments.extend_from_slice(rest);
        self.endpoint(segments.as_slice())
    }

    /// `drive/root/children`, or `drive/root:/{path}:/children` for a folder path.
    ///
    /// Each folder name becomes its own encoded segment, so `..` cannot climb
    /// out of the drive root.
    fn drive_children_endpoint(&self, user: &str, path: Option<&str>) -> Result<Url, CollaboratorError> {
        let parts: Vec<&str> = path
            .unwrap_or_default()
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();
        let mut segments: Vec<String> = Self::user_segments(user)
            .into_iter()
            .chain(["drive"])
            .map(String::from)
            .collect();
        match parts.split_last() {
            None => segments.extend(["root".to_string(), "children".to_string()]),
            Some((last, folders)) => {
                if let Some(bad) = parts.iter().find(|p| **p == "." || **p == "..") {
                    return Err(CollaboratorError::InvalidRequest(format!(
                        "invalid path segment '{}'",
                        bad
                    )));
                }
                segments.push("root:".to_string());
                segments.extend(folders.iter().map(|f| f.to_string()));
                segments.push(format!("{}:", last));
                segments.push("children".to_string());
            }
        }
        self.endpoint(segments.as_slice())
    }

    /// Current bearer token, acquiring a new one when the cached one expired.
    async fn bearer(&self) -> Result<String, CollaboratorError> {
        let (tenant_id, client_id, client_secret, scopes) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
                scopes,
            } => (tenant_id, client_id, client_secret, scopes),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let token_url = format!("{}/{}/oauth2/v2.0/token", self.login_url, tenant_id);
        let scope = scopes.join(" ");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CollaboratorError::AuthenticationFailed(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::AuthenticationFailed(format!(
                "token acquisition failed: {}",
                body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CollaboratorError::AuthenticationFailed(e.to_string()))?;

        let value = body
            .get("access_token")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| {
                CollaboratorError::AuthenticationFailed("no access token in response".to_string())
            })?;
        let expires_in = body.get("expires_in").and_then(Value::as_u64).unwrap_or(3600);

        *cached = Some(CachedToken {
            value: value.clone(),
            expires_at: Instant::now()
                + Duration::from_secs(expires_in.min(MAX_TOKEN_LIFETIME_SECS).saturating_sub(60)),
        });
        Ok(value)
    }

    async fn request(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, CollaboratorError> {
        let token = self.bearer().await?;
        log::debug!("GraphApiClient: {} {}", method, url);
        let path = url.path().to_string();

        let mut request = self.http.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let text = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if status.is_success() {
            return Ok(body);
        }

        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed"))
            .to_string();

        Err(match status {
            StatusCode::UNAUTHORIZED => CollaboratorError::AuthenticationFailed(message),
            StatusCode::FORBIDDEN => CollaboratorError::PermissionDenied(message),
            StatusCode::NOT_FOUND => CollaboratorError::NotFound(path),
            StatusCode::TOO_MANY_REQUESTS => CollaboratorError::RateLimited(retry_after),
            other => CollaboratorError::Upstream {
                status: other.as_u16(),
                message,
            },
        })
    }

    async fn get(&self, url: Url, query: &[(&str, String)]) -> Result<Value, CollaboratorError> {
        self.request(Method::GET, url, query, None).await
    }

    async fn post(&self, url: Url, body: &Value) -> Result<Value, CollaboratorError> {
        self.request(Method::POST, url, &[], Some(body)).await
    }
}

/// Escape a value for use inside a single-quoted OData string literal.
fn odata_quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl GraphClient for GraphApiClient {
    fn name(&self) -> &str {
        "Microsoft Graph API"
    }

    fn supported_operations(&self) -> Vec<GraphOperation> {
        GraphOperation::ALL.to_vec()
    }

    async fn list_events(
        &self,
        user: &str,
        range: &TimeRange,
        top: u32,
    ) -> Result<Value, CollaboratorError> {
        match (&range.start, &range.end) {
            (Some(start), Some(end)) => {
                self.get(
                    self.user_endpoint(user, &["calendarView"])?,
                    &[
                        ("startDateTime", start.clone()),
                        ("endDateTime", end.clone()),
                        ("$top", top.to_string()),
                        ("$orderby", "start/dateTime".to_string()),
                    ],
                )
                .await
            }
            _ => {
                self.get(
                    self.user_endpoint(user, &["events"])?,
                    &[
                        ("$top", top.to_string()),
                        ("$orderby", "start/dateTime".to_string()),
                    ],
                )
                .await
            }
        }
    }

    async fn create_event(&self, user: &str, event: &Value) -> Result<Value, CollaboratorError> {
        self.post(self.user_endpoint(user, &["events"])?, event).await
    }

    async fn update_event(
        &self,
        user: &str,
        event_id: &str,
        patch: &Value,
    ) -> Result<Value, CollaboratorError> {
        self.request(
            Method::PATCH,
            self.user_endpoint(user, &["events", event_id])?,
            &[],
            Some(patch),
        )
        .await
    }

    async fn delete_event(&self, user: &str, event_id: &str) -> Result<(), CollaboratorError> {
        self.request(
            Method::DELETE,
            self.user_endpoint(user, &["events", event_id])?,
            &[],
            None,
        )
        .await
        .map(|_| ())
    }

    async fn find_meeting_times(&self, user: &str, request: &Value) -> Result<Value, CollaboratorError> {
        self.post(self.user_endpoint(user, &["findMeetingTimes"])?, request)
            .await
    }

    async fn list_messages(
        &self,
        user: &str,
        folder: &str,
        top: u32,
    ) -> Result<Value, CollaboratorError> {
        self.get(
            self.user_endpoint(user, &["mailFolders", folder, "messages"])?,
            &[("$top", top.to_string())],
        )
        .await
    }

    async fn send_mail(&self, user: &str, request: &Value) -> Result<(), CollaboratorError> {
        self.post(self.user_endpoint(user, &["sendMail"])?, request)
            .await
            .map(|_| ())
    }

    async fn search_messages(
        &self,
        user: &str,
        query: &str,
        top: u32,
    ) -> Result<Value, CollaboratorError> {
        self.get(
            self.user_endpoint(user, &["messages"])?,
            &[("$search", format!("\"{}\"", query)), ("$top", top.to_string())],
        )
        .await
    }

    async fn search_people(
        &self,
        user: &str,
        query: &str,
        top: u32,
    ) -> Result<Value, CollaboratorError> {
        self.get(
            self.user_endpoint(user, &["people"])?,
            &[("$search", format!("\"{}\"", query)), ("$top", top.to_string())],
        )
        .await
    }

    async fn get_user(&self, id: &str) -> Result<Value, CollaboratorError> {
        self.get(self.user_endpoint(id, &[])?, &[]).await
    }

    async fn list_drive_items(
        &self,
        user: &str,
        path: Option<&str>,
    ) -> Result<Value, CollaboratorError> {
        self.get(self.drive_children_endpoint(user, path)?, &[]).await
    }

    async fn search_drive_items(&self, user: &str, query: &str) -> Result<Value, CollaboratorError> {
        let search = format!("search(q='{}')", odata_quote(query));
        self.get(self.user_endpoint(user, &["drive", "root", &search])?, &[])
            .await
    }

    async fn get_drive_item(&self, user: &str, item_id: &str) -> Result<Value, CollaboratorError> {
        self.get(self.user_endpoint(user, &["drive", "items", item_id])?, &[])
            .await
    }

    async fn create_sharing_link(
        &self,
        user: &str,
        item_id: &str,
        link_type: &str,
        scope: &str,
    ) -> Result<Value, CollaboratorError> {
        self.post(
            self.user_endpoint(user, &["drive", "items", item_id, "createLink"])?,
            &json!({ "type": link_type, "scope": scope }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn static_config() -> GraphConfig {
        GraphConfig {
            base_url: "https://graph.example.test/v1.0/".to_string(),
            access_token: Some("tok".to_string()),
            ..GraphConfig::default()
        }
    }

    #[test]
    fn test_requires_credentials() {
        let err = GraphApiClient::from_config(&GraphConfig::default()).err().unwrap();
        assert!(matches!(err, CollaboratorError::InvalidConfig(_)));
    }

    #[test]
    fn test_client_credentials_accepted() {
        let config = GraphConfig {
            tenant_id: Some("t".to_string()),
            client_id: Some("c".to_string()),
            client_secret: Some("s".to_string()),
            ..GraphConfig::default()
        };
        assert!(GraphApiClient::from_config(&config).is_ok());
    }

    #[test]
    fn test_url_building() {
        let client = GraphApiClient::from_config(&static_config()).unwrap();
        assert_eq!(
            client.user_endpoint("me", &["events"]).unwrap().as_str(),
            "https://graph.example.test/v1.0/me/events"
        );
        assert_eq!(
            client.user_endpoint("", &["events"]).unwrap().as_str(),
            "https://graph.example.test/v1.0/me/events"
        );
        assert_eq!(
            client.user_endpoint("alice@contoso.com", &[]).unwrap().path(),
            "/v1.0/users/alice@contoso.com"
        );
    }

    #[test]
    fn test_ids_cannot_escape_their_segment() {
        let client = GraphApiClient::from_config(&static_config()).unwrap();
        let url = client
            .user_endpoint("me", &["drive", "items", "../../users/victim/messages"])
            .unwrap();
        assert_eq!(
            url.path(),
            "/v1.0/me/drive/items/..%2F..%2Fusers%2Fvictim%2Fmessages"
        );

        let url = client
            .user_endpoint("bob/../../admin", &["events", "e1?$select=x#frag"])
            .unwrap();
        assert_eq!(url.path_segments().unwrap().count(), 5);
        assert!(url.query().is_none());
        assert!(url.fragment().is_none());

        for id in ["..", ".", ""] {
            let err = client.user_endpoint("me", &["events", id]).err().unwrap();
            assert!(matches!(err, CollaboratorError::InvalidRequest(_)));
            assert_eq!(err.code(), "invalidRequest");
        }
    }

    #[test]
    fn test_drive_path_segments() {
        let client = GraphApiClient::from_config(&static_config()).unwrap();
        assert_eq!(
            client.drive_children_endpoint("me", None).unwrap().path(),
            "/v1.0/me/drive/root/children"
        );
        assert_eq!(
            client
                .drive_children_endpoint("me", Some("/Documents/Q3 plans/"))
                .unwrap()
                .path(),
            "/v1.0/me/drive/root:/Documents/Q3%20plans:/children"
        );
        let err = client
            .drive_children_endpoint("me", Some("Documents/../../../users/victim"))
            .err()
            .unwrap();
        assert!(matches!(err, CollaboratorError::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_unparseable_base_url() {
        let config = GraphConfig {
            base_url: "not a url".to_string(),
            ..static_config()
        };
        let err = GraphApiClient::from_config(&config).err().unwrap();
        assert!(matches!(err, CollaboratorError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_static_token_used_directly() {
        let client = GraphApiClient::from_config(&static_config()).unwrap();
        assert_eq!(client.bearer().await.unwrap(), "tok");
        assert!(client.supports(GraphOperation::CreateSharingLink));
    }

    #[test]
    fn test_odata_quote() {
        assert_eq!(odata_quote("Q3 'final' plan"), "Q3 ''final'' plan");
    }
}
