//! # Error Pipeline
//!
//! Uniform, structured failure reporting for every part of the hub.
//!
//! ```text
//! failure
//!   ↓  ErrorSpec::new(category, message).severity(..).context(..)
//! ErrorPipeline::create()
//!   ├── sanitize context (password, token, secret, ...)
//!   ├── assign id + timestamp
//!   ├── log at severity
//!   └── ErrorNotifier::notify()  (event bus → "error.created")
//!         └── on failure: re-enter at depth + 1, bounded by MAX_RECURSION_DEPTH
//! ```
//!
//! Errors leave the process only through [`ApiError`], the caller-safe
//! projection of a [`StructuredError`].

pub mod pipeline;
pub mod sanitize;
pub mod structured;

pub use pipeline::{ErrorNotifier, ErrorPipeline, LAST_RESORT_TARGET, MAX_RECURSION_DEPTH};
pub use sanitize::{is_sensitive_key, sanitize_context};
pub use structured::{ApiError, ErrorCategory, ErrorKind, ErrorSpec, Severity, StructuredError};
