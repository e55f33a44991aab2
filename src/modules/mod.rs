//! Module system: capability modules and the dispatch protocol they share.
//!
//! # Architecture
//!
//! ```text
//! ModuleDependencies (graph client, cache, error pipeline, event bus)
//!   ↓  ModuleInit::init()
//! Module (id, name, capabilities, priority)
//!   ↓  CapabilityRegistry::register()
//! handle_intent(intent, entities, context)
//!   ↓  IntentDispatcher::dispatch()
//! normalize → route → execute → report
//! ```
//!
//! The built-in calendar, mail, people and files modules live in [`builtin`].

pub mod builtin;
pub mod error;
pub mod module_def;
pub mod runtime;

// Re-exports
pub use error::DispatchFailure;
pub use module_def::{validate_shape, Module, ModuleDependencies, ModuleInit, ShapeViolation};
pub use runtime::{
    CallContext, DispatchContext, DispatcherBuilder, HandlerResult, Intent, IntentContext,
    IntentDispatcher, IntentHandler, IntentResponse,
};
