//! # Collaborator Interfaces
//!
//! Modules reach the outside world only through narrow traits:
//!
//! ```text
//! Module
//!   ├── GraphClient  (calendar, mail, people, files operations)
//!   │     └── GraphApiClient  (Microsoft Graph over reqwest)
//!   └── CacheClient  (get / set with TTL)
//!         └── InMemoryCache
//! ```
//!
//! A client declares which operations it implements through
//! [`GraphClient::supported_operations`]; modules check that list when they
//! are constructed.

pub mod adapter;
pub mod adapters;
pub mod cache;

pub use adapter::{CollaboratorError, GraphClient, GraphOperation, TimeRange};
pub use adapters::graph_api::GraphApiClient;
pub use cache::{CacheClient, InMemoryCache};
