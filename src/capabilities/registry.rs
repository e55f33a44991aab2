//! Capability Registry: owns registered modules and resolves capabilities.
//!
//! Registration validates in a fixed order so the caller always learns the
//! most specific reason for a rejection:
//!
//! 1. shape check (`ModuleInvalid`)
//! 2. duplicate id check (`DuplicateModule`)
//! 3. capability index update, registration record, `module.registered` event
//!
//! Registration is meant to happen during startup. Lookups take a read lock
//! and never hold it across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline, ErrorSpec, StructuredError};
use crate::events::types::{names, ModuleRegistered, ModulesFound};
use crate::events::EventBus;
use crate::modules::{validate_shape, Module};

use super::index::CapabilityIndex;

/// When a module was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub module_id: String,
    pub registered_at: DateTime<Utc>,
}

/// Serializable view of one registered module.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSummary {
    pub id: String,
    pub name: String,
    pub capabilities: Vec<String>,
    pub priority: i32,
    pub registered_at: String,
}

struct Entry {
    module: Arc<dyn Module>,
    priority: i32,
    record: RegistrationRecord,
}

#[derive(Default)]
struct Inner {
    modules: HashMap<String, Entry>,
    /// Module ids in registration order.
    order: Vec<String>,
    index: CapabilityIndex,
}

/// Registry of capability modules.
pub struct CapabilityRegistry {
    inner: RwLock<Inner>,
    errors: Arc<ErrorPipeline>,
    events: Arc<EventBus>,
    diagnostics: bool,
}

impl CapabilityRegistry {
    pub fn new(errors: Arc<ErrorPipeline>, events: Arc<EventBus>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            errors,
            events,
            diagnostics: false,
        }
    }

    pub fn diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    // ------------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------------

    /// Register a module at its own priority.
    pub async fn register(&self, module: Arc<dyn Module>) -> Result<(), StructuredError> {
        self.register_with_priority(module, None).await
    }

    /// Register a module, optionally overriding its declared priority.
    pub async fn register_with_priority(
        &self,
        module: Arc<dyn Module>,
        priority: Option<i32>,
    ) -> Result<(), StructuredError> {
        if let Err(violation) = validate_shape(module.as_ref()) {
            let spec = ErrorSpec::new(ErrorCategory::Module, format!("Invalid module: {}", violation))
                .kind(ErrorKind::ModuleInvalid)
                .with("moduleId", module.id())
                .with("reason", violation.to_string());
            return Err(self.errors.create(spec).await);
        }

        let id = module.id().to_string();
        let priority = priority.unwrap_or_else(|| module.priority());

        let accepted = {
            let mut inner = self.inner.write();
            if inner.modules.contains_key(&id) {
                false
            } else {
                inner.index.insert(&id, module.capabilities());
                inner.order.push(id.clone());
                inner.modules.insert(
                    id.clone(),
                    Entry {
                        module: Arc::clone(&module),
                        priority,
                        record: RegistrationRecord {
                            module_id: id.clone(),
                            registered_at: Utc::now(),
                        },
                    },
                );
                true
            }
        };

        if !accepted {
            let spec = ErrorSpec::new(
                ErrorCategory::Module,
                format!("Module with id '{}' is already registered", id),
            )
            .kind(ErrorKind::DuplicateModule)
            .with("moduleId", id.as_str());
            return Err(self.errors.create(spec).await);
        }

        log::info!(
            "CapabilityRegistry: registered '{}' ({}) priority={} capabilities=[{}]",
            id,
            module.name(),
            priority,
            module.capabilities().join(", ")
        );

        let event = ModuleRegistered {
            module_id: id,
            module_name: module.name().to_string(),
            capabilities: module.capabilities().to_vec(),
        };
        self.events
            .emit_serialized(names::MODULE_REGISTERED, &event)
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Non-strict lookup.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Module>> {
        self.inner
            .read()
            .modules
            .get(id)
            .map(|entry| Arc::clone(&entry.module))
    }

    /// Strict lookup; a miss is reported as `ModuleNotFound`.
    pub async fn require(&self, id: &str) -> Result<Arc<dyn Module>, StructuredError> {
        if let Some(module) = self.get(id) {
            return Ok(module);
        }
        let spec = ErrorSpec::new(ErrorCategory::Module, format!("Module not found: {}", id))
            .kind(ErrorKind::ModuleNotFound)
            .with("moduleId", id);
        Err(self.errors.create(spec).await)
    }

    /// Every registered module, in registration order.
    pub fn all(&self) -> Vec<Arc<dyn Module>> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.modules.get(id))
            .map(|entry| Arc::clone(&entry.module))
            .collect()
    }

    /// Modules declaring `capability`, highest priority first.
    ///
    /// Equal priorities keep registration order. Publishes `modules.found`
    /// when the result is non-empty.
    pub async fn resolve(&self, capability: &str) -> Vec<Arc<dyn Module>> {
        let resolved: Vec<(i32, Arc<dyn Module>)> = {
            let inner = self.inner.read();
            let mut matches: Vec<(i32, Arc<dyn Module>)> = inner
                .index
                .modules_for(capability)
                .iter()
                .filter_map(|id| inner.modules.get(id))
                .map(|entry| (entry.priority, Arc::clone(&entry.module)))
                .collect();
            // Stable: ties stay in registration order.
            matches.sort_by(|a, b| b.0.cmp(&a.0));
            matches
        };

        if self.diagnostics {
            log::debug!(
                "CapabilityRegistry: resolve '{}' -> [{}]",
                capability,
                resolved
                    .iter()
                    .map(|(p, m)| format!("{}:{}", m.id(), p))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if !resolved.is_empty() {
            let event = ModulesFound {
                intent: capability.to_string(),
                module_ids: resolved.iter().map(|(_, m)| m.id().to_string()).collect(),
            };
            self.events.emit_serialized(names::MODULES_FOUND, &event).await;
        }

        resolved.into_iter().map(|(_, module)| module).collect()
    }

    /// Every capability across all modules, sorted.
    pub fn capabilities(&self) -> Vec<String> {
        self.inner.read().index.names()
    }

    /// When `id` was registered, if ever.
    pub fn registration_info(&self, id: &str) -> Option<RegistrationRecord> {
        self.inner
            .read()
            .modules
            .get(id)
            .map(|entry| entry.record.clone())
    }

    /// Effective priority of a registered module.
    pub fn priority_of(&self, id: &str) -> Option<i32> {
        self.inner.read().modules.get(id).map(|entry| entry.priority)
    }

    /// Introspection view, in registration order.
    pub fn summaries(&self) -> Vec<ModuleSummary> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.modules.get(id))
            .map(|entry| ModuleSummary {
                id: entry.module.id().to_string(),
                name: entry.module.name().to_string(),
                capabilities: entry.module.capabilities().to_vec(),
                priority: entry.priority,
                registered_at: entry
                    .record
                    .registered_at
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every module, record and index entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.modules.clear();
        inner.order.clear();
        inner.index.clear();
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new(Arc::new(ErrorPipeline::new()), Arc::new(EventBus::new()))
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CapabilityRegistry")
            .field("modules", &inner.order)
            .field("capabilities", &inner.index.len())
            .finish()
    }
}
