//! Well-known event names and their typed payloads.
//!
//! Payloads are plain serde structs; they travel through the bus as
//! `serde_json::Value` so observers outside the crate (dashboards, log
//! shippers) can consume them without depending on these types.

/// Capability registry events.
pub mod registry_events;

/// Intent dispatch reporting events.
pub mod dispatch_events;

pub use dispatch_events::{IntentCompleted, IntentFailed};
pub use registry_events::{ModuleRegistered, ModulesFound};

/// Event names published by the hub.
pub mod names {
    /// A module passed validation and was added to the registry.
    pub const MODULE_REGISTERED: &str = "module.registered";
    /// `resolve` found at least one module for a capability.
    pub const MODULES_FOUND: &str = "modules.found";
    /// The error pipeline created an error.
    pub const ERROR_CREATED: &str = "error.created";
    /// An intent dispatch succeeded.
    pub const INTENT_COMPLETED: &str = "intent.completed";
    /// An intent dispatch failed.
    pub const INTENT_FAILED: &str = "intent.failed";
}
