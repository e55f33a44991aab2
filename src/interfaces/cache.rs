//! Cache collaborator.
//!
//! Modules that cache lookups depend on the narrow [`CacheClient`] surface:
//! `get(key)` and `set(key, value, ttl_seconds)`. [`InMemoryCache`] is the
//! process-local implementation used by the server binary and in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::adapter::CollaboratorError;

/// Key/value cache with per-entry time-to-live.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CollaboratorError>;

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<(), CollaboratorError>;
}

/// Writes between sweeps of expired entries.
const SWEEP_INTERVAL: usize = 64;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// `None` when the TTL is too large to represent; the entry never expires.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Thread-safe in-memory cache.
///
/// Expired entries are dropped on read, by [`purge_expired`](Self::purge_expired),
/// and by a sweep every `SWEEP_INTERVAL` writes.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl CacheClient for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CollaboratorError> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Present but expired; a concurrent `set` may have refreshed it since.
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl_seconds: u64) -> Result<(), CollaboratorError> {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now().checked_add(Duration::from_secs(ttl_seconds)),
        };
        self.entries.write().insert(key.to_string(), entry);

        if (self.writes.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0 {
            let removed = self.purge_expired();
            if removed > 0 {
                log::debug!("InMemoryCache: swept {} expired entries", removed);
            }
        }
        Ok(())
    }
}
