//! Events published by the capability registry.

use serde::{Deserialize, Serialize};

/// Published after a successful `register`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRegistered {
    pub module_id: String,
    pub module_name: String,
    pub capabilities: Vec<String>,
}

/// Published when `resolve` returns a non-empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulesFound {
    pub intent: String,
    /// Resolved module ids, highest priority first.
    pub module_ids: Vec<String>,
}
