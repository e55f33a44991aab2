//! Hub configuration.
//!
//! Loaded from YAML (file or string) and overlaid with environment variables.
//! String values of the form `${VAR}` are resolved from the environment when
//! the file is loaded.
//!
//! ```yaml
//! environment: development
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! graph:
//!   access_token: "${GRAPH_ACCESS_TOKEN}"
//! cache:
//!   default_ttl_secs: 300
//! modules:
//!   mail:
//!     priority: 5
//!   files:
//!     enabled: false
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// `production`, `development`, ...
    pub environment: String,
    /// Verbose diagnostics regardless of environment.
    pub diagnostics: bool,
    pub server: ServerConfig,
    pub graph: GraphConfig,
    pub cache: CacheConfig,
    /// Per-module overrides keyed by module id.
    pub modules: HashMap<String, ModuleSettings>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            environment: "production".to_string(),
            diagnostics: false,
            server: ServerConfig::default(),
            graph: GraphConfig::default(),
            cache: CacheConfig::default(),
            modules: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Connection settings for the collaboration-service client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Static bearer token; takes precedence over client credentials.
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub scopes: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
            scopes: vec!["https://graph.microsoft.com/.default".to_string()],
            timeout_secs: 30,
        }
    }
}

impl GraphConfig {
    /// Whether enough credentials are present to build a client.
    pub fn has_credentials(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        set(&self.access_token)
            || (set(&self.tenant_id) && set(&self.client_id) && set(&self.client_secret))
    }
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for GraphConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphConfig")
            .field("base_url", &self.base_url)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("access_token", &self.access_token.as_ref().map(|_| "***"))
            .field("scopes", &self.scopes)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
        }
    }
}

/// Override for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    pub enabled: bool,
    pub priority: Option<i32>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: None,
        }
    }
}

impl HubConfig {
    /// Parse a YAML document, resolving `${VAR}` references.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        resolve_env_refs(&mut value);
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_value(value)?)
    }

    /// Load a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Load from `INTENT_HUB_CONFIG` when set (defaults otherwise), then
    /// apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("INTENT_HUB_CONFIG") {
            Ok(path) if !path.is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(env) = lookup("INTENT_HUB_ENV") {
            self.environment = env;
        }
        if let Some(flag) = lookup("INTENT_HUB_DIAGNOSTICS") {
            self.diagnostics = parse_bool("INTENT_HUB_DIAGNOSTICS", &flag)?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: port.clone(),
            })?;
        }
        if let Some(url) = lookup("GRAPH_BASE_URL") {
            self.graph.base_url = url;
        }
        if let Some(token) = lookup("GRAPH_ACCESS_TOKEN") {
            self.graph.access_token = Some(token);
        }
        if let Some(tenant) = lookup("AZURE_TENANT_ID") {
            self.graph.tenant_id = Some(tenant);
        }
        if let Some(client) = lookup("AZURE_CLIENT_ID") {
            self.graph.client_id = Some(client);
        }
        if let Some(secret) = lookup("AZURE_CLIENT_SECRET") {
            self.graph.client_secret = Some(secret);
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "development" | "dev")
    }

    /// Whether verbose diagnostic output is enabled.
    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics || self.is_development()
    }

    pub fn module_enabled(&self, module_id: &str) -> bool {
        self.modules.get(module_id).map_or(true, |m| m.enabled)
    }

    pub fn module_priority(&self, module_id: &str) -> Option<i32> {
        self.modules.get(module_id).and_then(|m| m.priority)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Resolve `${VAR}` string values in place; unset variables become empty.
fn resolve_env_refs(value: &mut serde_yaml::Value) {
    match value {
        serde_yaml::Value::String(s) => {
            if s.starts_with("${") && s.ends_with('}') && s.len() > 3 {
                let var_name = &s[2..s.len() - 1];
                *s = std::env::var(var_name).unwrap_or_default();
            }
        }
        serde_yaml::Value::Sequence(items) => items.iter_mut().for_each(resolve_env_refs),
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                resolve_env_refs(v);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HubConfig::default();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:8080");
        assert!(!config.diagnostics_enabled());
        assert!(config.module_enabled("calendar"));
        assert!(!config.graph.has_credentials());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
environment: development
server:
  port: 9090
modules:
  mail:
    priority: 5
  files:
    enabled: false
"#;
        let config = HubConfig::from_yaml(yaml).unwrap();
        assert!(config.diagnostics_enabled());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.module_priority("mail"), Some(5));
        assert!(!config.module_enabled("files"));
        assert!(config.module_enabled("people"));
        assert_eq!(config.cache.default_ttl_secs, 300);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = HubConfig::from_yaml("").unwrap();
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_env_reference_resolution() {
        std::env::set_var("INTENT_HUB_TEST_TOKEN_REF", "abc123");
        let yaml = "graph:\n  access_token: \"${INTENT_HUB_TEST_TOKEN_REF}\"\n";
        let config = HubConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.graph.access_token.as_deref(), Some("abc123"));
        assert!(config.graph.has_credentials());
    }

    #[test]
    fn test_overrides() {
        let mut config = HubConfig::default();
        let vars: HashMap<&str, &str> = [
            ("INTENT_HUB_DIAGNOSTICS", "yes"),
            ("PORT", "7000"),
            ("AZURE_TENANT_ID", "t"),
            ("AZURE_CLIENT_ID", "c"),
            ("AZURE_CLIENT_SECRET", "s"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.diagnostics);
        assert_eq!(config.server.port, 7000);
        assert!(config.graph.has_credentials());
    }

    #[test]
    fn test_invalid_override() {
        let mut config = HubConfig::default();
        let err = config
            .apply_overrides(|k| (k == "PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hub.yaml");
        std::fs::write(&path, "diagnostics: true\n").unwrap();
        let config = HubConfig::from_file(&path).unwrap();
        assert!(config.diagnostics);

        let missing = HubConfig::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let graph = GraphConfig {
            client_secret: Some("super-secret".to_string()),
            ..GraphConfig::default()
        };
        let rendered = format!("{:?}", graph);
        assert!(!rendered.contains("super-secret"));
    }
}
