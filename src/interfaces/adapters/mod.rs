//! Concrete collaborator clients.

pub mod graph_api;
