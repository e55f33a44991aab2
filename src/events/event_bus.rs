//! In-process event bus for best-effort cross-cutting notifications.
//!
//! Subscribers register an async handler for an event name. [`EventBus::emit`]
//! takes a snapshot of the current subscribers and awaits each handler in
//! subscription order, one at a time. Handler failures are logged and
//! collected in the [`EmitReport`]; they never stop delivery to later
//! handlers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{ErrorNotifier, StructuredError};

use super::types::names;

// ---------------------------------------------------------------------------
// Envelope and handler types
// ---------------------------------------------------------------------------

/// A named event with its payload, as delivered to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub name: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// Async event handler.
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Payload predicate evaluated before a handler is invoked.
pub type EventFilter = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Identifier returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

static SUBSCRIPTION_COUNTER: AtomicU64 = AtomicU64::new(1);

impl SubscriptionId {
    fn next() -> Self {
        Self(SUBSCRIPTION_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Options for [`EventBus::subscribe`].
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    /// Remove the subscription after its first successful delivery.
    pub once: bool,
    /// Skip payloads this predicate rejects.
    pub filter: Option<EventFilter>,
}

impl SubscribeOptions {
    pub fn once() -> Self {
        Self {
            once: true,
            filter: None,
        }
    }

    pub fn filter(mut self, filter: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("once", &self.once)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

struct Subscription {
    id: SubscriptionId,
    handler: EventHandler,
    filter: Option<EventFilter>,
    once: bool,
    /// Set while a `once` delivery is in flight or done.
    claimed: AtomicBool,
}

/// A handler failure collected during one emission.
#[derive(Debug)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub error: anyhow::Error,
}

/// Outcome of one [`EventBus::emit`] call.
#[derive(Debug, Default)]
pub struct EmitReport {
    /// Handlers that ran to completion successfully.
    pub delivered: usize,
    /// Subscribers skipped by their filter or an already-claimed `once`.
    pub skipped: usize,
    pub failures: Vec<HandlerFailure>,
}

impl EmitReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Publish/subscribe channel keyed by event name.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    diagnostics: bool,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            diagnostics: false,
        }
    }

    /// Enable per-delivery debug logging.
    pub fn with_diagnostics(diagnostics: bool) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            diagnostics,
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Subscribe `handler` to `event`.
    pub fn subscribe<F, Fut>(
        &self,
        event: impl Into<String>,
        handler: F,
        options: SubscribeOptions,
    ) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());
        self.subscribe_handler(event, handler, options)
    }

    /// Subscribe an already type-erased handler.
    pub fn subscribe_handler(
        &self,
        event: impl Into<String>,
        handler: EventHandler,
        options: SubscribeOptions,
    ) -> SubscriptionId {
        let id = SubscriptionId::next();
        let subscription = Arc::new(Subscription {
            id,
            handler,
            filter: options.filter,
            once: options.once,
            claimed: AtomicBool::new(false),
        });
        self.subscribers
            .write()
            .entry(event.into())
            .or_default()
            .push(subscription);
        id
    }

    /// Subscribe for every emission.
    pub fn on<F, Fut>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(event, handler, SubscribeOptions::default())
    }

    /// Subscribe for the first successful delivery only.
    pub fn once<F, Fut>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(event, handler, SubscribeOptions::once())
    }

    /// Remove one subscription. Returns whether it existed.
    ///
    /// An event name whose last subscriber goes away is dropped entirely.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut map = self.subscribers.write();
        let mut emptied = None;
        let mut removed = false;
        for (name, entries) in map.iter_mut() {
            let before = entries.len();
            entries.retain(|s| s.id != id);
            if entries.len() != before {
                removed = true;
                if entries.is_empty() {
                    emptied = Some(name.clone());
                }
                break;
            }
        }
        if let Some(name) = emptied {
            map.remove(&name);
        }
        removed
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    /// Number of live subscriptions for an event name.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers.read().get(event).map_or(0, Vec::len)
    }

    /// Event names that currently have at least one subscriber.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subscribers.read().keys().cloned().collect();
        names.sort();
        names
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Deliver `payload` to a snapshot of the subscribers of `event`.
    ///
    /// Handlers run sequentially in subscription order. With no subscribers
    /// this is a no-op.
    pub async fn emit(&self, event: &str, payload: Value) -> EmitReport {
        let snapshot: Vec<Arc<Subscription>> = match self.subscribers.read().get(event) {
            Some(entries) => entries.clone(),
            None => return EmitReport::default(),
        };

        let envelope = Event {
            name: event.to_string(),
            payload,
            timestamp: Utc::now(),
        };

        let mut report = EmitReport::default();
        for subscription in snapshot {
            if let Some(filter) = &subscription.filter {
                if !filter(&envelope.payload) {
                    report.skipped += 1;
                    continue;
                }
            }

            if subscription.once
                && subscription
                    .claimed
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
            {
                report.skipped += 1;
                continue;
            }

            if self.diagnostics {
                log::debug!("EventBus: delivering '{}' to {}", event, subscription.id);
            }

            match (subscription.handler)(envelope.clone()).await {
                Ok(()) => {
                    report.delivered += 1;
                    if subscription.once {
                        self.unsubscribe(subscription.id);
                    }
                }
                Err(error) => {
                    if subscription.once {
                        subscription.claimed.store(false, Ordering::Release);
                    }
                    log::warn!(
                        "EventBus: handler {} failed for '{}': {:#}",
                        subscription.id,
                        event,
                        error
                    );
                    report.failures.push(HandlerFailure {
                        subscription: subscription.id,
                        error,
                    });
                }
            }
        }
        report
    }

    /// Serialize `payload` and emit it; serialization failures are logged.
    pub async fn emit_serialized<T: Serialize>(&self, event: &str, payload: &T) -> EmitReport {
        match serde_json::to_value(payload) {
            Ok(value) => self.emit(event, value).await,
            Err(e) => {
                log::warn!("EventBus: could not serialize '{}' payload: {}", event, e);
                EmitReport::default()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// The bus reports every created error as `error.created`.
#[async_trait]
impl ErrorNotifier for EventBus {
    async fn notify(&self, error: &StructuredError) -> anyhow::Result<()> {
        let mut payload = json!({
            "error": error.to_api(),
            "kind": error.kind(),
        });
        if let Some(map) = payload.as_object_mut() {
            for (key, value) in [
                ("traceId", error.trace_id()),
                ("userId", error.user_id()),
                ("deviceId", error.device_id()),
            ] {
                if let Some(value) = value {
                    map.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }

        let report = self.emit(names::ERROR_CREATED, payload).await;
        match report.failures.into_iter().next() {
            None => Ok(()),
            Some(failure) => Err(failure
                .error
                .context(format!("'{}' handler {} failed", names::ERROR_CREATED, failure.subscription))),
        }
    }
}
