//! Error pipeline: manufactures, logs and reports structured errors.
//!
//! Every failure in the hub goes through [`ErrorPipeline::create`]. After the
//! error is built it is handed to the configured [`ErrorNotifier`] (normally
//! the event bus). Notification can itself fail, and reporting that failure
//! goes back through the pipeline, so every call carries an explicit depth.
//! Past [`MAX_RECURSION_DEPTH`] the pipeline stops and hands back a synthetic
//! `RecursionLimit` error instead of notifying again.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::structured::{
    ApiError, ErrorCategory, ErrorKind, ErrorSpec, Severity, StructuredError,
};

/// Depth past which the pipeline refuses to notify.
pub const MAX_RECURSION_DEPTH: u32 = 3;

/// Log target for messages that must not go through the pipeline itself.
pub const LAST_RESORT_TARGET: &str = "intent_hub::last_resort";

/// Downstream consumer of freshly created errors.
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn notify(&self, error: &StructuredError) -> anyhow::Result<()>;
}

/// Builds structured errors and reports them.
pub struct ErrorPipeline {
    notifier: Option<Arc<dyn ErrorNotifier>>,
    diagnostics: bool,
}

impl ErrorPipeline {
    /// A pipeline with no downstream notification.
    pub fn new() -> Self {
        Self {
            notifier: None,
            diagnostics: false,
        }
    }

    /// A pipeline that hands every error to `notifier`.
    pub fn with_notifier(notifier: Arc<dyn ErrorNotifier>) -> Self {
        Self {
            notifier: Some(notifier),
            diagnostics: false,
        }
    }

    /// Enable verbose diagnostic logging of error context.
    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Create and report an error.
    ///
    /// Always returns the error described by `spec`; secondary failures while
    /// notifying are reported separately and never replace it.
    pub async fn create(&self, spec: ErrorSpec) -> StructuredError {
        self.create_at_depth(spec, 0).await
    }

    /// Positional form of [`create`](Self::create).
    pub async fn create_error(
        &self,
        category: impl Into<ErrorCategory>,
        message: impl Into<String>,
        severity: Severity,
        context: Value,
    ) -> StructuredError {
        self.create(ErrorSpec::new(category, message).severity(severity).context(context))
            .await
    }

    /// Project an error into its caller-safe shape.
    pub fn create_api_error(&self, error: &StructuredError) -> ApiError {
        error.to_api()
    }

    /// Create an error at an explicit recursion depth.
    ///
    /// Depth 0 is an original failure; each failed notification re-enters at
    /// `depth + 1`.
    pub fn create_at_depth(&self, spec: ErrorSpec, depth: u32) -> BoxFuture<'_, StructuredError> {
        async move {
            if depth > MAX_RECURSION_DEPTH {
                log::error!(
                    target: LAST_RESORT_TARGET,
                    "ErrorPipeline: recursion limit reached at depth {} while reporting [{}] {}",
                    depth,
                    spec.category,
                    spec.message,
                );
                return StructuredError::from_spec(recursion_limit_spec(&spec, depth));
            }

            let error = StructuredError::from_spec(spec);
            self.log_error(&error);

            if let Some(notifier) = &self.notifier {
                if let Err(e) = notifier.notify(&error).await {
                    let secondary = ErrorSpec::new(
                        ErrorCategory::System,
                        "Failed to notify error observers",
                    )
                    .severity(Severity::Error)
                    .with("originalErrorId", error.id())
                    .with("originalCategory", error.category().as_str())
                    .with("notificationError", format!("{e:#}"))
                    .with("depth", depth + 1)
                    .trace_id(error.trace_id());
                    let _ = self.create_at_depth(secondary, depth + 1).await;
                }
            }

            error
        }
        .boxed()
    }

    fn log_error(&self, error: &StructuredError) {
        log::log!(
            error.severity().log_level(),
            "[{}] {} (id={}, kind={:?}, trace={})",
            error.category(),
            error.message(),
            error.id(),
            error.kind(),
            error.trace_id().unwrap_or("-"),
        );
        if self.diagnostics {
            log::debug!(
                "ErrorPipeline: context for {}: {}",
                error.id(),
                Value::Object(error.context().clone())
            );
        }
    }
}

impl Default for ErrorPipeline {
    fn default() -> Self {
        Self::new()
    }
}

fn recursion_limit_spec(spec: &ErrorSpec, depth: u32) -> ErrorSpec {
    ErrorSpec::new(ErrorCategory::System, "Error recursion limit reached")
        .kind(ErrorKind::RecursionLimit)
        .severity(Severity::Critical)
        .with("depth", depth)
        .with("maxDepth", MAX_RECURSION_DEPTH)
        .with("suppressedCategory", spec.category.as_str())
        .with("suppressedMessage", spec.message.clone())
        .trace_id(spec.trace_id.clone())
}
