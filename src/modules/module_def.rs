//! Module contract: the [`Module`] trait, its async constructor and the
//! dependency bag handed to it.
//!
//! A module is a unit of capability. Once registered it is owned by the
//! [`CapabilityRegistry`](crate::capabilities::CapabilityRegistry), which only
//! ever hands out shared references, so identity and capability list cannot
//! change after registration.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline, ErrorSpec, StructuredError};
use crate::events::EventBus;
use crate::interfaces::{CacheClient, GraphClient, GraphOperation};

use super::runtime::{IntentContext, IntentResponse};

// ============================================================================
// Module trait
// ============================================================================

/// A registered capability provider.
#[async_trait]
pub trait Module: Send + Sync {
    /// Globally unique identifier.
    fn id(&self) -> &str;

    /// Display name.
    fn name(&self) -> &str;

    /// Intent names this module handles, in declaration order.
    fn capabilities(&self) -> &[String];

    /// Resolution priority; higher wins.
    fn priority(&self) -> i32 {
        0
    }

    /// Dispatch entry point.
    ///
    /// Returns exactly one of a response envelope or a structured error.
    async fn handle_intent(
        &self,
        intent: &str,
        entities: &Value,
        context: &IntentContext,
    ) -> Result<IntentResponse, StructuredError>;
}

/// Async construction from the dependency bag.
#[async_trait]
pub trait ModuleInit: Module + Sized {
    async fn init(deps: ModuleDependencies) -> Result<Self, StructuredError>;
}

// ============================================================================
// Shape validation
// ============================================================================

/// Why a module failed the shape check at registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeViolation {
    #[error("module id must be a non-empty string")]
    BlankId,

    #[error("module name must be a non-empty string")]
    BlankName,

    #[error("module must declare at least one capability")]
    NoCapabilities,

    #[error("capability at position {0} is blank")]
    BlankCapability(usize),

    #[error("capability '{0}' is declared more than once")]
    DuplicateCapability(String),
}

/// Check the parts of the module shape the type system cannot enforce.
pub fn validate_shape(module: &dyn Module) -> Result<(), ShapeViolation> {
    if module.id().trim().is_empty() {
        return Err(ShapeViolation::BlankId);
    }
    if module.name().trim().is_empty() {
        return Err(ShapeViolation::BlankName);
    }
    let capabilities = module.capabilities();
    if capabilities.is_empty() {
        return Err(ShapeViolation::NoCapabilities);
    }
    let mut seen = HashSet::with_capacity(capabilities.len());
    for (position, capability) in capabilities.iter().enumerate() {
        if capability.trim().is_empty() {
            return Err(ShapeViolation::BlankCapability(position));
        }
        if !seen.insert(capability.as_str()) {
            return Err(ShapeViolation::DuplicateCapability(capability.clone()));
        }
    }
    Ok(())
}

// ============================================================================
// Dependency bag
// ============================================================================

/// Everything a module may need at construction time.
#[derive(Clone)]
pub struct ModuleDependencies {
    pub graph: Option<Arc<dyn GraphClient>>,
    pub cache: Option<Arc<dyn CacheClient>>,
    pub errors: Arc<ErrorPipeline>,
    pub events: Arc<EventBus>,
    /// Verbose diagnostic logging; never changes behavior.
    pub diagnostics: bool,
    /// Default TTL for cached lookups.
    pub cache_ttl_secs: u64,
}

impl ModuleDependencies {
    pub fn new(errors: Arc<ErrorPipeline>, events: Arc<EventBus>) -> Self {
        Self {
            graph: None,
            cache: None,
            errors,
            events,
            diagnostics: false,
            cache_ttl_secs: 300,
        }
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphClient>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    pub fn cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    /// The graph client, provided it offers every operation in `operations`.
    ///
    /// Fails with `MethodNotImplemented` when the client is absent or lacks
    /// one of the operations.
    pub async fn require_graph(
        &self,
        module_id: &str,
        operations: &[GraphOperation],
    ) -> Result<Arc<dyn GraphClient>, StructuredError> {
        let category = ErrorCategory::for_module(module_id);
        let graph = match &self.graph {
            Some(graph) => graph,
            None => {
                let spec = ErrorSpec::new(category, "Graph client dependency is not configured")
                    .kind(ErrorKind::MethodNotImplemented)
                    .with("moduleId", module_id);
                return Err(self.errors.create(spec).await);
            }
        };

        let missing: Vec<&str> = operations
            .iter()
            .filter(|op| !graph.supports(**op))
            .map(|op| op.as_str())
            .collect();
        if !missing.is_empty() {
            let spec = ErrorSpec::new(
                category,
                format!(
                    "Graph client '{}' does not implement: {}",
                    graph.name(),
                    missing.join(", ")
                ),
            )
            .kind(ErrorKind::MethodNotImplemented)
            .with("moduleId", module_id)
            .with("client", graph.name())
            .with("missing", missing);
            return Err(self.errors.create(spec).await);
        }

        Ok(Arc::clone(graph))
    }
}

impl std::fmt::Debug for ModuleDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleDependencies")
            .field("graph", &self.graph.as_ref().map(|g| g.name().to_string()))
            .field("cache", &self.cache.is_some())
            .field("diagnostics", &self.diagnostics)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .finish()
    }
}
