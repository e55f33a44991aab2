//! HTTP boundary for the intent hub.
//!
//! # Endpoints
//!
//! - `GET  /health`       — Liveness probe
//! - `GET  /capabilities` — Routable intents
//! - `GET  /modules`      — Registered modules
//! - `GET  /modules/:id`  — One module
//! - `POST /intents`      — Dispatch an intent

pub mod routes;

pub use routes::{app_router, call_context, status_for, AppState, ErrorResponse, IntentRequest};
