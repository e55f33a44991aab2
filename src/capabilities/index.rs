//! Capability → module index.

use std::collections::BTreeMap;

/// Maps each capability name to the ids of the modules declaring it.
///
/// Ids are kept in insertion order, which is registration order. The index is
/// only ever written by the registry during `register` and `clear`.
#[derive(Debug, Default, Clone)]
pub struct CapabilityIndex {
    entries: BTreeMap<String, Vec<String>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one module's capabilities.
    pub(crate) fn insert(&mut self, module_id: &str, capabilities: &[String]) {
        for capability in capabilities {
            let ids = self.entries.entry(capability.clone()).or_default();
            if !ids.iter().any(|id| id == module_id) {
                ids.push(module_id.to_string());
            }
        }
    }

    /// Module ids declaring `capability`, in registration order.
    pub fn modules_for(&self, capability: &str) -> &[String] {
        self.entries
            .get(capability)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every capability name, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.entries.contains_key(capability)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
