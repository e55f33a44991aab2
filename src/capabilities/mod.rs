//! # Capability Registry
//!
//! Holds the registered modules and a capability → module index used to
//! route intents.
//!
//! ## Resolution Flow
//!
//! 1. Startup registers each module: `registry.register(Arc::new(module))`
//! 2. A caller asks `registry.resolve("getEvents")`
//! 3. Matching modules come back highest priority first, ties in
//!    registration order
//! 4. The caller invokes `handle_intent` on the first one

pub mod index;
pub mod registry;

pub use index::CapabilityIndex;
pub use registry::{CapabilityRegistry, ModuleSummary, RegistrationRecord};
