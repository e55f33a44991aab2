//! Intent dispatch runtime.
//!
//! Every module turns `(intent, entities, context)` into a response through an
//! [`IntentDispatcher`]. The dispatcher applies the same sequence to every
//! call:
//!
//! ```text
//! Received → Normalize → Route ─┬─ Execute (timed) ─┬─ Succeeded ─┐
//!                               │                   └─ Failed ────┤
//!                               └─ no handler ──────── Failed ────┴─ Report → caller
//! ```
//!
//! Both terminal states pass through reporting (log line plus an
//! `intent.completed` / `intent.failed` event) before control returns.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline, ErrorSpec, Severity, StructuredError};
use crate::events::types::{names, IntentCompleted, IntentFailed};
use crate::events::EventBus;

use super::error::{classify, Classified, DispatchFailure};
use super::module_def::ModuleDependencies;

// ============================================================================
// Intents
// ============================================================================

/// A module's closed set of intents.
pub trait Intent: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Every intent, in declaration order.
    const ALL: &'static [Self];

    /// Wire name, e.g. `getEvents`.
    fn as_str(&self) -> &'static str;

    /// Look up an intent by wire name.
    fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.as_str() == name)
    }
}

// ============================================================================
// Contexts
// ============================================================================

/// Identifiers the transport extracted from the incoming call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub trace_id: Option<String>,
}

/// Caller-supplied context for one intent.
///
/// Explicit ids win; anything missing falls back to [`CallContext`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub trace_id: Option<String>,
    #[serde(skip)]
    pub call: CallContext,
}

impl IntentContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_call(mut self, call: CallContext) -> Self {
        self.call = call;
        self
    }

    /// Resolve actor ids and make sure a trace id exists.
    pub fn normalize(&self) -> DispatchContext {
        fn pick(explicit: &Option<String>, fallback: &Option<String>) -> Option<String> {
            explicit
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| fallback.as_deref().filter(|s| !s.trim().is_empty()))
                .map(str::to_string)
        }

        DispatchContext {
            user_id: pick(&self.user_id, &self.call.user_id),
            session_id: pick(&self.session_id, &self.call.session_id),
            device_id: pick(&self.device_id, &self.call.device_id),
            trace_id: pick(&self.trace_id, &self.call.trace_id)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        }
    }
}

/// Normalized context handed to handlers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchContext {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub device_id: Option<String>,
    pub trace_id: String,
}

impl DispatchContext {
    /// The principal collaborator calls act on; `"me"` when anonymous.
    pub fn principal(&self) -> &str {
        self.user_id.as_deref().unwrap_or("me")
    }

    /// Attach correlation ids to an error spec.
    pub fn correlate(&self, spec: ErrorSpec) -> ErrorSpec {
        spec.trace_id(Some(self.trace_id.as_str()))
            .user_id(self.user_id.as_deref())
            .device_id(self.device_id.as_deref())
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// Discriminated response: serializes as `{"type": <tag>, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResponse {
    #[serde(rename = "type")]
    pub response_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl IntentResponse {
    pub fn new(response_type: impl Into<String>) -> Self {
        Self {
            response_type: response_type.into(),
            payload: Map::new(),
        }
    }

    /// A collection response: `items` under `key`, plus a `count`.
    pub fn list(response_type: impl Into<String>, key: &str, items: Vec<Value>) -> Self {
        let count = items.len();
        Self::new(response_type)
            .with(key, Value::Array(items))
            .with("count", count)
    }

    /// Add a payload field. `type` is reserved for the tag and ignored.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "type" {
            self.payload.insert(key, value.into());
        }
        self
    }

    /// Number of items when this is a collection response.
    pub fn item_count(&self) -> Option<usize> {
        self.payload
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

pub type HandlerResult = Result<IntentResponse, DispatchFailure>;

/// Type-erased intent handler over module state `S`.
pub type IntentHandler<S> =
    Arc<dyn Fn(Arc<S>, Value, DispatchContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Builds an immutable intent → handler map.
pub struct DispatcherBuilder<I: Intent, S> {
    module_id: String,
    state: Arc<S>,
    handlers: HashMap<I, IntentHandler<S>>,
    order: Vec<I>,
}

impl<I: Intent, S: Send + Sync + 'static> DispatcherBuilder<I, S> {
    pub fn new(module_id: impl Into<String>, state: S) -> Self {
        Self {
            module_id: module_id.into(),
            state: Arc::new(state),
            handlers: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Route `intent` to `handler`. Routing an intent twice keeps the last handler.
    pub fn route<F, Fut>(mut self, intent: I, handler: F) -> Self
    where
        F: Fn(Arc<S>, Value, DispatchContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: IntentHandler<S> =
            Arc::new(move |state, entities, ctx| handler(state, entities, ctx).boxed());
        if self.handlers.insert(intent, handler).is_none() {
            self.order.push(intent);
        }
        self
    }

    pub fn build(self, deps: &ModuleDependencies) -> IntentDispatcher<I, S> {
        let capabilities = self.order.iter().map(|i| i.as_str().to_string()).collect();
        IntentDispatcher {
            category: ErrorCategory::for_module(&self.module_id),
            module_id: self.module_id,
            state: self.state,
            handlers: self.handlers,
            capabilities,
            errors: Arc::clone(&deps.errors),
            events: Arc::clone(&deps.events),
            diagnostics: deps.diagnostics,
        }
    }
}

/// Runs the dispatch protocol for one module.
pub struct IntentDispatcher<I: Intent, S> {
    module_id: String,
    category: ErrorCategory,
    state: Arc<S>,
    handlers: HashMap<I, IntentHandler<S>>,
    capabilities: Vec<String>,
    errors: Arc<ErrorPipeline>,
    events: Arc<EventBus>,
    diagnostics: bool,
}

impl<I: Intent, S: Send + Sync + 'static> IntentDispatcher<I, S> {
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn category(&self) -> &ErrorCategory {
        &self.category
    }

    /// Routed intent names, in routing order.
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn supports(&self, intent: &str) -> bool {
        I::parse(intent).is_some_and(|i| self.handlers.contains_key(&i))
    }

    /// Normalize, route, execute, report.
    pub async fn dispatch(
        &self,
        intent: &str,
        entities: &Value,
        context: &IntentContext,
    ) -> Result<IntentResponse, StructuredError> {
        let started = Instant::now();

        let ctx = context.normalize();
        if self.diagnostics {
            log::debug!(
                "[{}] normalize intent={} user={} session={} trace={}",
                self.module_id,
                intent,
                ctx.user_id.as_deref().unwrap_or("-"),
                ctx.session_id.as_deref().unwrap_or("-"),
                ctx.trace_id,
            );
        }

        let handler = I::parse(intent).and_then(|i| self.handlers.get(&i));
        let outcome = match handler {
            Some(handler) => {
                if self.diagnostics {
                    log::debug!("[{}] route intent={} -> handler", self.module_id, intent);
                }
                match handler(Arc::clone(&self.state), entities.clone(), ctx.clone()).await {
                    Ok(response) => Ok(response),
                    Err(failure) => Err(self.structure(failure, intent, &ctx).await),
                }
            }
            None => Err(self.unsupported(intent, &ctx).await),
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.report(intent, &ctx, duration_ms, &outcome).await;
        outcome
    }

    async fn unsupported(&self, intent: &str, ctx: &DispatchContext) -> StructuredError {
        let spec = ErrorSpec::new(
            self.category.clone(),
            format!("Unsupported intent: {}", intent),
        )
        .kind(ErrorKind::UnsupportedIntent)
        .severity(Severity::Warning)
        .with("intent", intent)
        .with("moduleId", self.module_id.as_str());
        self.errors.create(ctx.correlate(spec)).await
    }

    async fn structure(
        &self,
        failure: DispatchFailure,
        intent: &str,
        ctx: &DispatchContext,
    ) -> StructuredError {
        match classify(failure, &self.module_id, &self.category, intent) {
            Classified::Passthrough(error) => error,
            Classified::Wrap(spec) => self.errors.create(ctx.correlate(spec)).await,
        }
    }

    async fn report(
        &self,
        intent: &str,
        ctx: &DispatchContext,
        duration_ms: u64,
        outcome: &Result<IntentResponse, StructuredError>,
    ) {
        match outcome {
            Ok(response) => {
                let item_count = response.item_count();
                log::info!(
                    "[{}] {} succeeded in {}ms (type={}, items={}, trace={})",
                    self.module_id,
                    intent,
                    duration_ms,
                    response.response_type,
                    item_count.map_or_else(|| "-".to_string(), |n| n.to_string()),
                    ctx.trace_id,
                );
                let record = IntentCompleted {
                    module_id: self.module_id.clone(),
                    intent: intent.to_string(),
                    response_type: response.response_type.clone(),
                    duration_ms,
                    item_count,
                    trace_id: ctx.trace_id.clone(),
                };
                self.events
                    .emit_serialized(names::INTENT_COMPLETED, &record)
                    .await;
            }
            Err(error) => {
                log::log!(
                    error.severity().log_level(),
                    "[{}] {} failed in {}ms: {} (error={}, trace={})",
                    self.module_id,
                    intent,
                    duration_ms,
                    error.message(),
                    error.id(),
                    ctx.trace_id,
                );
                let record = IntentFailed {
                    module_id: self.module_id.clone(),
                    intent: intent.to_string(),
                    duration_ms,
                    error_id: error.id().to_string(),
                    kind: error.kind(),
                    category: error.category().clone(),
                    severity: error.severity(),
                    trace_id: ctx.trace_id.clone(),
                };
                self.events.emit_serialized(names::INTENT_FAILED, &record).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Event;
    use crate::interfaces::{CollaboratorError, GraphOperation};
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum EchoIntent {
        Echo,
        Fail,
        Explode,
        Missing,
        Unrouted,
    }

    impl Intent for EchoIntent {
        const ALL: &'static [Self] = &[
            Self::Echo,
            Self::Fail,
            Self::Explode,
            Self::Missing,
            Self::Unrouted,
        ];

        fn as_str(&self) -> &'static str {
            match self {
                Self::Echo => "echo",
                Self::Fail => "fail",
                Self::Explode => "explode",
                Self::Missing => "missing",
                Self::Unrouted => "unrouted",
            }
        }
    }

    struct EchoState {
        prefix: String,
    }

    async fn echo(state: Arc<EchoState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
        Ok(IntentResponse::list(
            "echoList",
            "items",
            vec![json!(format!("{}{}", state.prefix, entities["text"]))],
        )
        .with("user", ctx.principal()))
    }

    async fn fail(_: Arc<EchoState>, _: Value, _: DispatchContext) -> HandlerResult {
        Err(DispatchFailure::invalid_input("boom"))
    }

    async fn explode(_: Arc<EchoState>, _: Value, _: DispatchContext) -> HandlerResult {
        let error = ErrorPipeline::new()
            .create(ErrorSpec::new(ErrorCategory::Auth, "token expired"))
            .await;
        Err(error.into())
    }

    async fn missing(_: Arc<EchoState>, _: Value, _: DispatchContext) -> HandlerResult {
        Err(CollaboratorError::NotImplemented(GraphOperation::SendMail).into())
    }

    struct Fixture {
        dispatcher: IntentDispatcher<EchoIntent, EchoState>,
        events: Arc<EventBus>,
        seen: Arc<Mutex<Vec<Event>>>,
    }

    fn fixture() -> Fixture {
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in [names::INTENT_COMPLETED, names::INTENT_FAILED] {
            let seen = seen.clone();
            events.on(name, move |event| {
                let seen = seen.clone();
                async move {
                    seen.lock().push(event);
                    Ok(())
                }
            });
        }
        let deps = ModuleDependencies::new(Arc::new(ErrorPipeline::new()), events.clone());
        let dispatcher = DispatcherBuilder::new(
            "echo",
            EchoState {
                prefix: "> ".to_string(),
            },
        )
        .route(EchoIntent::Echo, echo)
        .route(EchoIntent::Fail, fail)
        .route(EchoIntent::Explode, explode)
        .route(EchoIntent::Missing, missing)
        .build(&deps);
        Fixture {
            dispatcher,
            events,
            seen,
        }
    }

    #[test]
    fn test_capabilities_follow_routing_order() {
        let f = fixture();
        assert_eq!(
            f.dispatcher.capabilities(),
            &["echo", "fail", "explode", "missing"]
        );
        assert!(f.dispatcher.supports("echo"));
        assert!(!f.dispatcher.supports("unrouted"));
        assert!(!f.dispatcher.supports("nope"));
    }

    #[tokio::test]
    async fn test_success_envelope_and_report() {
        let f = fixture();
        let response = f
            .dispatcher
            .dispatch("echo", &json!({"text": "hi"}), &IntentContext::for_user("u-1"))
            .await
            .unwrap();
        assert_eq!(response.response_type, "echoList");
        assert_eq!(response.item_count(), Some(1));

        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire["type"], json!("echoList"));
        assert_eq!(wire["user"], json!("u-1"));

        let seen = f.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].name, names::INTENT_COMPLETED);
        assert_eq!(seen[0].payload["itemCount"], json!(1));
        assert_eq!(seen[0].payload["moduleId"], json!("echo"));
    }

    #[tokio::test]
    async fn test_unsupported_intent_is_warning() {
        let f = fixture();
        for intent in ["unrouted", "getEvents"] {
            let err = f
                .dispatcher
                .dispatch(intent, &json!({"range": {}}), &IntentContext::new())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::UnsupportedIntent);
            assert_eq!(err.severity(), Severity::Warning);
            assert_eq!(
                err.category(),
                &ErrorCategory::Custom("echo".to_string())
            );
            assert_eq!(err.context()["intent"], json!(intent));
            assert_eq!(err.context()["moduleId"], json!("echo"));
        }
        let seen = f.seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|e| e.name == names::INTENT_FAILED));
    }

    #[tokio::test]
    async fn test_raw_failure_is_wrapped() {
        let f = fixture();
        let ctx = IntentContext {
            trace_id: Some("trace-42".to_string()),
            ..IntentContext::default()
        };
        let err = f
            .dispatcher
            .dispatch("fail", &Value::Null, &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrappedFailure);
        assert_eq!(err.category(), f.dispatcher.category());
        assert_eq!(err.context()["originalError"], json!("boom"));
        assert_eq!(err.trace_id(), Some("trace-42"));
        assert_eq!(f.seen.lock()[0].payload["traceId"], json!("trace-42"));
    }

    #[tokio::test]
    async fn test_structured_failure_propagates_unchanged() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch("explode", &Value::Null, &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.category(), &ErrorCategory::Auth);
        assert_eq!(err.message(), "token expired");
    }

    #[tokio::test]
    async fn test_not_implemented_dependency() {
        let f = fixture();
        let err = f
            .dispatcher
            .dispatch("missing", &Value::Null, &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotImplemented);
        assert_eq!(err.severity(), Severity::Error);
    }

    #[tokio::test]
    async fn test_every_call_reports_exactly_once() {
        let f = fixture();
        for intent in ["echo", "fail", "explode", "missing", "unrouted"] {
            let _ = f
                .dispatcher
                .dispatch(intent, &json!({"text": "x"}), &IntentContext::new())
                .await;
        }
        assert_eq!(f.seen.lock().len(), 5);
        assert_eq!(f.events.subscriber_count(names::INTENT_FAILED), 1);
    }

    #[test]
    fn test_normalize_falls_back_to_call_context() {
        let ctx = IntentContext {
            user_id: Some(" ".to_string()),
            device_id: Some("dev-1".to_string()),
            ..IntentContext::default()
        }
        .with_call(CallContext {
            user_id: Some("from-call".to_string()),
            session_id: Some("s-1".to_string()),
            ..CallContext::default()
        });
        let normalized = ctx.normalize();
        assert_eq!(normalized.user_id.as_deref(), Some("from-call"));
        assert_eq!(normalized.session_id.as_deref(), Some("s-1"));
        assert_eq!(normalized.device_id.as_deref(), Some("dev-1"));
        assert!(!normalized.trace_id.is_empty());
        assert_eq!(IntentContext::new().normalize().principal(), "me");
    }

    #[test]
    fn test_response_type_key_is_reserved() {
        let response = IntentResponse::new("person").with("type", "other").with("id", "p1");
        let wire = serde_json::to_value(&response).unwrap();
        assert_eq!(wire, json!({"type": "person", "id": "p1"}));
        assert_eq!(response.item_count(), None);
    }
}
