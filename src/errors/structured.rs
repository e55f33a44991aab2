//! The uniform error value every component reports failures with.
//!
//! A [`StructuredError`] is created once per failure and never mutated.
//! Construction goes through [`ErrorSpec`] so that category and message can
//! never be empty, and the context is sanitized before it is stored.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use super::sanitize::sanitize_context;

// ============================================================================
// Category / severity / kind
// ============================================================================

/// Error category. Closed for the core subsystems, extensible through
/// [`ErrorCategory::Custom`] for module domains the core does not know.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ErrorCategory {
    Auth,
    Graph,
    Api,
    Database,
    Module,
    Nlu,
    System,
    Calendar,
    Mail,
    People,
    Files,
    Custom(String),
}

impl ErrorCategory {
    /// Derive the category a module reports its own failures under.
    ///
    /// Known domains map to their variant; anything else becomes a custom
    /// category named after the module id.
    pub fn for_module(module_id: &str) -> Self {
        Self::from(module_id.trim().to_lowercase())
    }

    /// Lowercase wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Auth => "auth",
            Self::Graph => "graph",
            Self::Api => "api",
            Self::Database => "database",
            Self::Module => "module",
            Self::Nlu => "nlu",
            Self::System => "system",
            Self::Calendar => "calendar",
            Self::Mail => "mail",
            Self::People => "people",
            Self::Files => "files",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for ErrorCategory {
    fn from(value: String) -> Self {
        match value.as_str() {
            "auth" => Self::Auth,
            "graph" => Self::Graph,
            "api" => Self::Api,
            "database" => Self::Database,
            "module" => Self::Module,
            "nlu" => Self::Nlu,
            "system" => Self::System,
            "calendar" => Self::Calendar,
            "mail" => Self::Mail,
            "people" => Self::People,
            "files" => Self::Files,
            "" => Self::System,
            _ => Self::Custom(value),
        }
    }
}

impl From<&str> for ErrorCategory {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ErrorCategory> for String {
    fn from(value: ErrorCategory) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// The `log` level an error of this severity is reported at.
    pub fn log_level(&self) -> log::Level {
        match self {
            Self::Info => log::Level::Info,
            Self::Warning => log::Level::Warn,
            Self::Error | Self::Critical => log::Level::Error,
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which failure class of the taxonomy an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Registration rejected: malformed module shape.
    ModuleInvalid,
    /// Registration rejected: id collision.
    DuplicateModule,
    /// Strict lookup miss.
    ModuleNotFound,
    /// No handler for the requested intent.
    UnsupportedIntent,
    /// A dependency lacks an operation the module needs.
    MethodNotImplemented,
    /// A raw handler failure wrapped with the module's category.
    WrappedFailure,
    /// Synthetic error from the pipeline's circuit breaker.
    RecursionLimit,
    /// Anything not covered above.
    General,
}

impl Default for ErrorKind {
    fn default() -> Self {
        Self::General
    }
}

// ============================================================================
// ErrorSpec
// ============================================================================

/// Everything needed to manufacture a [`StructuredError`].
#[derive(Debug, Clone)]
pub struct ErrorSpec {
    pub(crate) kind: ErrorKind,
    pub(crate) category: ErrorCategory,
    pub(crate) message: String,
    pub(crate) severity: Severity,
    pub(crate) context: Map<String, Value>,
    pub(crate) trace_id: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) device_id: Option<String>,
}

impl ErrorSpec {
    /// Start a spec with the given category and message (severity `error`).
    pub fn new(category: impl Into<ErrorCategory>, message: impl Into<String>) -> Self {
        let category = match category.into() {
            ErrorCategory::Custom(name) if name.trim().is_empty() => ErrorCategory::System,
            other => other,
        };
        let message = message.into();
        let message = if message.trim().is_empty() {
            "Unknown error".to_string()
        } else {
            message
        };
        Self {
            kind: ErrorKind::General,
            category,
            message,
            severity: Severity::Error,
            context: Map::new(),
            trace_id: None,
            user_id: None,
            device_id: None,
        }
    }

    pub fn kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Replace the context. Non-object values are kept under `"value"`.
    pub fn context(mut self, context: Value) -> Self {
        self.context = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        self
    }

    /// Add a single context entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn trace_id(mut self, trace_id: Option<impl Into<String>>) -> Self {
        self.trace_id = trace_id.map(Into::into);
        self
    }

    pub fn user_id(mut self, user_id: Option<impl Into<String>>) -> Self {
        self.user_id = user_id.map(Into::into);
        self
    }

    pub fn device_id(mut self, device_id: Option<impl Into<String>>) -> Self {
        self.device_id = device_id.map(Into::into);
        self
    }
}

// ============================================================================
// StructuredError
// ============================================================================

/// Immutable, serializable error value.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("[{category}] {message}")]
pub struct StructuredError {
    id: String,
    kind: ErrorKind,
    category: ErrorCategory,
    message: String,
    severity: Severity,
    context: Map<String, Value>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    device_id: Option<String>,
}

impl StructuredError {
    /// Materialize a spec: fresh id, current timestamp, sanitized context.
    ///
    /// Does not notify anyone; use [`ErrorPipeline::create`](super::ErrorPipeline::create)
    /// for the reported path.
    pub(crate) fn from_spec(spec: ErrorSpec) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: spec.kind,
            category: spec.category,
            message: spec.message,
            severity: spec.severity,
            context: sanitize_context(spec.context),
            timestamp: Utc::now(),
            trace_id: spec.trace_id,
            user_id: spec.user_id,
            device_id: spec.device_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// ISO-8601 rendering of the creation time.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Caller-safe projection for API boundaries.
    pub fn to_api(&self) -> ApiError {
        ApiError {
            id: self.id.clone(),
            category: self.category.clone(),
            message: self.message.clone(),
            severity: self.severity,
            context: self.context.clone(),
            timestamp: self.timestamp_iso(),
        }
    }
}

/// The only shape in which errors leave the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub id: String,
    pub category: ErrorCategory,
    pub message: String,
    pub severity: Severity,
    pub context: Map<String, Value>,
    pub timestamp: String,
}
