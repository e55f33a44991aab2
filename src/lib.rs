//! # Intent Hub
//!
//! Pluggable capability modules (calendar, mail, people, files) behind a
//! uniform intent-routing layer, delegating the actual work to a
//! collaboration service such as Microsoft Graph.
//!
//! The core is the capability registry, the intent dispatch protocol every
//! module follows, and the error/event contract binding modules to the rest
//! of the system:
//!
//! - [`errors`]: structured errors, sanitization, the error pipeline
//! - [`events`]: in-process event bus
//! - [`capabilities`]: module registry and capability index
//! - [`modules`]: module contract, dispatch runtime, built-in modules
//! - [`interfaces`]: collaborator traits and clients
//! - [`hub`] and [`server`]: bootstrap and HTTP boundary

pub mod capabilities;
pub mod config;
pub mod errors;
pub mod events;
pub mod hub;
pub mod interfaces;
pub mod modules;
pub mod server;

pub use capabilities::{CapabilityRegistry, ModuleSummary};
pub use config::HubConfig;
pub use errors::{ApiError, ErrorCategory, ErrorKind, ErrorPipeline, ErrorSpec, Severity, StructuredError};
pub use events::{Event, EventBus};
pub use hub::{BootstrapReport, Hub};
pub use modules::{IntentContext, IntentResponse, Module, ModuleDependencies, ModuleInit};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
