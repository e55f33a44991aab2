//! # Event Bus
//!
//! In-process publish/subscribe used for fire-and-forget notifications such
//! as "module registered" or "error created". Nothing load-bearing for a
//! request's outcome travels over the bus.
//!
//! ```text
//! producer ── emit(name, payload) ──► snapshot of subscribers
//!                                       ├─ filter? ─ skip
//!                                       ├─ handler 1 (awaited)
//!                                       ├─ handler 2 (awaited)
//!                                       └─ ...
//! ```

pub mod event_bus;
pub mod types;

pub use event_bus::{
    EmitReport, Event, EventBus, EventFilter, EventHandler, HandlerFailure, SubscribeOptions,
    SubscriptionId,
};
pub use types::names;
