//! The hub: one explicit object owning the event bus, error pipeline and
//! capability registry for the life of the process.
//!
//! ```text
//! Hub::new(config)
//!   ├── EventBus
//!   ├── ErrorPipeline ──notifies──► EventBus ("error.created")
//!   └── CapabilityRegistry
//!
//! hub.register_builtin_modules(hub.dependencies(graph, cache))
//! hub.handle(intent, entities, context)
//!   → registry.resolve(intent) → highest priority module → handle_intent
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::capabilities::CapabilityRegistry;
use crate::config::HubConfig;
use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline, ErrorSpec, Severity, StructuredError};
use crate::events::EventBus;
use crate::interfaces::{CacheClient, GraphClient};
use crate::modules::builtin::{create_builtin, BUILTIN_MODULE_IDS};
use crate::modules::{IntentContext, IntentResponse, ModuleDependencies};

/// Outcome of [`Hub::register_builtin_modules`].
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapReport {
    pub registered: Vec<String>,
    /// Disabled in configuration.
    pub skipped: Vec<String>,
    /// Failed to initialize or register; each failure was already reported.
    pub failed: Vec<StructuredError>,
}

impl BootstrapReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Hub {
    config: HubConfig,
    events: Arc<EventBus>,
    errors: Arc<ErrorPipeline>,
    registry: Arc<CapabilityRegistry>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        let diagnostics = config.diagnostics_enabled();
        let events = Arc::new(EventBus::with_diagnostics(diagnostics));
        let errors = Arc::new(
            ErrorPipeline::with_notifier(events.clone()).diagnostics(diagnostics),
        );
        let registry = Arc::new(
            CapabilityRegistry::new(errors.clone(), events.clone()).diagnostics(diagnostics),
        );
        Self {
            config,
            events,
            errors,
            registry,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn errors(&self) -> &Arc<ErrorPipeline> {
        &self.errors
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Build the dependency bag modules are constructed from.
    pub fn dependencies(
        &self,
        graph: Option<Arc<dyn GraphClient>>,
        cache: Option<Arc<dyn CacheClient>>,
    ) -> ModuleDependencies {
        let mut deps = ModuleDependencies::new(self.errors.clone(), self.events.clone())
            .diagnostics(self.config.diagnostics_enabled())
            .cache_ttl(self.config.cache.default_ttl_secs);
        if let Some(graph) = graph {
            deps = deps.with_graph(graph);
        }
        if let Some(cache) = cache.filter(|_| self.config.cache.enabled) {
            deps = deps.with_cache(cache);
        }
        deps
    }

    /// Construct and register every enabled built-in module.
    ///
    /// A module that fails is recorded in the report; the others are still
    /// registered.
    pub async fn register_builtin_modules(&self, deps: ModuleDependencies) -> BootstrapReport {
        let mut report = BootstrapReport::default();
        for id in BUILTIN_MODULE_IDS {
            if !self.config.module_enabled(id) {
                log::info!("Hub: module '{}' disabled by configuration", id);
                report.skipped.push(id.to_string());
                continue;
            }
            let module = match create_builtin(id, deps.clone()).await {
                Some(Ok(module)) => module,
                Some(Err(error)) => {
                    report.failed.push(error);
                    continue;
                }
                None => continue,
            };
            match self
                .registry
                .register_with_priority(module, self.config.module_priority(id))
                .await
            {
                Ok(()) => report.registered.push(id.to_string()),
                Err(error) => report.failed.push(error),
            }
        }
        report
    }

    /// Route an intent to the highest-priority module declaring it.
    pub async fn handle(
        &self,
        intent: &str,
        entities: &Value,
        context: &IntentContext,
    ) -> Result<IntentResponse, StructuredError> {
        let context = with_trace(context);
        let modules = self.registry.resolve(intent).await;
        match modules.first() {
            Some(module) => module.handle_intent(intent, entities, &context).await,
            None => {
                let spec = ErrorSpec::new(ErrorCategory::Nlu, format!("No module handles intent: {}", intent))
                    .kind(ErrorKind::UnsupportedIntent)
                    .severity(Severity::Warning)
                    .with("intent", intent);
                Err(self.errors.create(context.normalize().correlate(spec)).await)
            }
        }
    }

    /// Dispatch directly to one module by id.
    pub async fn handle_on(
        &self,
        module_id: &str,
        intent: &str,
        entities: &Value,
        context: &IntentContext,
    ) -> Result<IntentResponse, StructuredError> {
        let module = self.registry.require(module_id).await?;
        module.handle_intent(intent, entities, &with_trace(context)).await
    }

    /// Drop every module and subscription.
    pub fn clear(&self) {
        self.registry.clear();
        self.events.clear();
    }
}

/// Pin a trace id so every layer below reports under the same one.
fn with_trace(context: &IntentContext) -> IntentContext {
    let mut context = context.clone();
    if context.trace_id.as_deref().map_or(true, |t| t.trim().is_empty()) {
        context.trace_id = Some(context.normalize().trace_id);
    }
    context
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
