//! Events published when an intent dispatch is reported.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorCategory, ErrorKind, Severity};

/// Success-path observability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentCompleted {
    pub module_id: String,
    pub intent: String,
    pub response_type: String,
    pub duration_ms: u64,
    /// Number of items in the result, when the result is a collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_count: Option<usize>,
    pub trace_id: String,
}

/// Failure-path observability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentFailed {
    pub module_id: String,
    pub intent: String,
    pub duration_ms: u64,
    pub error_id: String,
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub severity: Severity,
    pub trace_id: String,
}
