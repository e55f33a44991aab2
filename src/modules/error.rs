//! Handler failures and their classification into structured errors.

use serde_json::Value;
use thiserror::Error;

use crate::errors::{ErrorCategory, ErrorKind, ErrorSpec, Severity, StructuredError};
use crate::interfaces::CollaboratorError;

/// What an intent handler may fail with.
///
/// Handlers use `?` freely on collaborator calls, on pipeline-built errors and
/// on `anyhow` results; the dispatcher turns whichever variant comes back into
/// exactly one [`StructuredError`].
#[derive(Debug, Error)]
pub enum DispatchFailure {
    /// Already structured; propagated unchanged.
    #[error(transparent)]
    Structured(#[from] StructuredError),

    /// A collaborator call failed.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// The caller's entities are missing or malformed.
    #[error("{0}")]
    InvalidInput(String),

    /// Anything else raised inside a handler.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispatchFailure {
    /// Shorthand for a handler-side input problem.
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput(message.to_string())
    }
}

/// Outcome of [`classify`].
pub(crate) enum Classified {
    /// Already structured; must be returned as-is.
    Passthrough(StructuredError),
    /// Needs to go through the error pipeline.
    Wrap(ErrorSpec),
}

/// The single place that decides "already structured" versus "needs wrapping".
pub(crate) fn classify(
    failure: DispatchFailure,
    module_id: &str,
    category: &ErrorCategory,
    intent: &str,
) -> Classified {
    match failure {
        DispatchFailure::Structured(error) => Classified::Passthrough(error),
        DispatchFailure::Collaborator(CollaboratorError::NotImplemented(operation)) => {
            Classified::Wrap(
                ErrorSpec::new(
                    category.clone(),
                    format!("Dependency method not implemented: {}", operation),
                )
                .kind(ErrorKind::MethodNotImplemented)
                .severity(Severity::Error)
                .with("moduleId", module_id)
                .with("intent", intent)
                .with("operation", operation.as_str()),
            )
        }
        DispatchFailure::Collaborator(error) => {
            let mut spec = ErrorSpec::new(
                category.clone(),
                format!("Failed to handle {} intent", intent),
            )
            .kind(ErrorKind::WrappedFailure)
            .with("moduleId", module_id)
            .with("intent", intent)
            .with("originalError", error.to_string())
            .with("collaboratorCode", error.code());
            match error {
                CollaboratorError::Upstream { status, .. } => {
                    spec = spec.with("status", status);
                }
                CollaboratorError::RateLimited(Some(secs)) => {
                    spec = spec.with("retryAfterSecs", secs);
                }
                _ => {}
            }
            Classified::Wrap(spec)
        }
        DispatchFailure::InvalidInput(message) => Classified::Wrap(
            ErrorSpec::new(
                category.clone(),
                format!("Failed to handle {} intent", intent),
            )
            .kind(ErrorKind::WrappedFailure)
            .with("moduleId", module_id)
            .with("intent", intent)
            .with("originalError", message)
            .with("invalidInput", true),
        ),
        DispatchFailure::Other(error) => Classified::Wrap(
            ErrorSpec::new(
                category.clone(),
                format!("Failed to handle {} intent", intent),
            )
            .kind(ErrorKind::WrappedFailure)
            .with("moduleId", module_id)
            .with("intent", intent)
            .with("originalError", Value::String(format!("{:#}", error))),
        ),
    }
}
