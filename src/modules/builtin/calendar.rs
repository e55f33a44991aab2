//! Calendar module: events and meeting-time suggestions.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::StructuredError;
use crate::interfaces::{GraphClient, GraphOperation, TimeRange};
use crate::modules::error::DispatchFailure;
use crate::modules::module_def::{ModuleDependencies, ModuleInit};
use crate::modules::runtime::{
    DispatchContext, DispatcherBuilder, HandlerResult, Intent, IntentDispatcher, IntentResponse,
};

use super::{collection, entity_object, entity_str, entity_top, require_str};

pub const MODULE_ID: &str = "calendar";

const DEFAULT_TOP: u32 = 50;
const MAX_TOP: u32 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarIntent {
    GetEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    FindMeetingTimes,
}

impl Intent for CalendarIntent {
    const ALL: &'static [Self] = &[
        Self::GetEvents,
        Self::CreateEvent,
        Self::UpdateEvent,
        Self::DeleteEvent,
        Self::FindMeetingTimes,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Self::GetEvents => "getEvents",
            Self::CreateEvent => "createEvent",
            Self::UpdateEvent => "updateEvent",
            Self::DeleteEvent => "deleteEvent",
            Self::FindMeetingTimes => "findMeetingTimes",
        }
    }
}

struct CalendarState {
    graph: Arc<dyn GraphClient>,
}

pub struct CalendarModule {
    dispatcher: IntentDispatcher<CalendarIntent, CalendarState>,
}

impl_dispatch_module!(CalendarModule, "Calendar");

#[async_trait]
impl ModuleInit for CalendarModule {
    async fn init(deps: ModuleDependencies) -> Result<Self, StructuredError> {
        let graph = deps
            .require_graph(
                MODULE_ID,
                &[
                    GraphOperation::ListEvents,
                    GraphOperation::CreateEvent,
                    GraphOperation::UpdateEvent,
                    GraphOperation::DeleteEvent,
                    GraphOperation::FindMeetingTimes,
                ],
            )
            .await?;

        let dispatcher = DispatcherBuilder::new(MODULE_ID, CalendarState { graph })
            .route(CalendarIntent::GetEvents, get_events)
            .route(CalendarIntent::CreateEvent, create_event)
            .route(CalendarIntent::UpdateEvent, update_event)
            .route(CalendarIntent::DeleteEvent, delete_event)
            .route(CalendarIntent::FindMeetingTimes, find_meeting_times)
            .build(&deps);

        Ok(Self { dispatcher })
    }
}

/// `range` object, or top-level `start`/`end`.
fn time_range(entities: &Value) -> TimeRange {
    let source = entity_object(entities, &["range", "timeRange"]);
    TimeRange {
        start: entity_str(source, &["start", "startDateTime"]).map(str::to_string),
        end: entity_str(source, &["end", "endDateTime"]).map(str::to_string),
    }
}

async fn get_events(state: Arc<CalendarState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let range = time_range(&entities);
    let top = entity_top(&entities, DEFAULT_TOP, MAX_TOP);
    let events = state.graph.list_events(ctx.principal(), &range, top).await?;
    Ok(IntentResponse::list("calendarList", "events", collection(events)).with("range", json!(range)))
}

async fn create_event(state: Arc<CalendarState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let event = entity_object(&entities, &["event"]);
    require_str(event, &["subject"])?;
    let created = state.graph.create_event(ctx.principal(), event).await?;
    Ok(IntentResponse::new("calendarEventCreated").with("event", created))
}

async fn update_event(state: Arc<CalendarState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let event_id = require_str(&entities, &["eventId", "id"])?;
    let patch = match entities.get("changes").or_else(|| entities.get("event")) {
        Some(patch) if patch.is_object() => patch,
        _ => return Err(DispatchFailure::invalid_input("missing required entity 'changes'")),
    };
    let updated = state
        .graph
        .update_event(ctx.principal(), event_id, patch)
        .await?;
    Ok(IntentResponse::new("calendarEventUpdated").with("event", updated))
}

async fn delete_event(state: Arc<CalendarState>, entities: Value, ctx: DispatchContext) -> HandlerResult {
    let event_id = require_str(&entities, &["eventId", "id"])?;
    state.graph.delete_event(ctx.principal(), event_id).await?;
    Ok(IntentResponse::new("calendarEventDeleted")
        .with("eventId", event_id)
        .with("deleted", true))
}

async fn find_meeting_times(
    state: Arc<CalendarState>,
    entities: Value,
    ctx: DispatchContext,
) -> HandlerResult {
    let request = entity_object(&entities, &["request"]);
    let mut result = state
        .graph
        .find_meeting_times(ctx.principal(), request)
        .await?;
    let suggestions = match result.get_mut("meetingTimeSuggestions").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    let mut response = IntentResponse::list("calendarMeetingTimes", "suggestions", suggestions);
    if let Some(reason) = result
        .get("emptySuggestionsReason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
    {
        response = response.with("emptySuggestionsReason", reason);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, ErrorKind, ErrorPipeline, Severity};
    use crate::events::EventBus;
    use crate::modules::builtin::testing::FakeGraph;
    use crate::modules::{IntentContext, Module};

    async fn calendar(graph: FakeGraph) -> (CalendarModule, Arc<FakeGraph>) {
        let graph = Arc::new(graph);
        let deps = ModuleDependencies::new(Arc::new(ErrorPipeline::new()), Arc::new(EventBus::new()))
            .with_graph(graph.clone());
        (CalendarModule::init(deps).await.unwrap(), graph)
    }

    #[tokio::test]
    async fn test_shape() {
        let (module, _) = calendar(FakeGraph::new()).await;
        assert_eq!(module.id(), "calendar");
        assert_eq!(module.name(), "Calendar");
        assert_eq!(module.priority(), 0);
        assert_eq!(module.capabilities().len(), CalendarIntent::ALL.len());
    }

    #[tokio::test]
    async fn test_get_events() {
        let (module, graph) = calendar(FakeGraph::new().respond(
            GraphOperation::ListEvents,
            json!({"value": [{"id": "e1"}, {"id": "e2"}]}),
        ))
        .await;
        let response = module
            .handle_intent(
                "getEvents",
                &json!({"range": {"start": "2026-01-01T00:00:00Z", "end": "2026-01-02T00:00:00Z"}}),
                &IntentContext::for_user("alice"),
            )
            .await
            .unwrap();
        assert_eq!(response.response_type, "calendarList");
        assert_eq!(response.item_count(), Some(2));

        let calls = graph.calls_to(GraphOperation::ListEvents);
        assert_eq!(calls[0]["user"], json!("alice"));
        assert_eq!(calls[0]["range"]["start"], json!("2026-01-01T00:00:00Z"));
        assert_eq!(calls[0]["top"], json!(DEFAULT_TOP));
    }

    #[tokio::test]
    async fn test_create_event_requires_subject() {
        let (module, graph) = calendar(FakeGraph::new()).await;
        let err = module
            .handle_intent("createEvent", &json!({"event": {"body": "x"}}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrappedFailure);
        assert_eq!(err.category(), &ErrorCategory::Calendar);
        assert!(graph.calls_to(GraphOperation::CreateEvent).is_empty());
    }

    #[tokio::test]
    async fn test_create_and_delete() {
        let (module, graph) = calendar(
            FakeGraph::new().respond(GraphOperation::CreateEvent, json!({"id": "new", "subject": "Sync"})),
        )
        .await;
        let created = module
            .handle_intent("createEvent", &json!({"subject": "Sync"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(created.response_type, "calendarEventCreated");
        assert_eq!(created.payload["event"]["id"], json!("new"));
        assert_eq!(graph.calls_to(GraphOperation::CreateEvent)[0]["user"], json!("me"));

        let deleted = module
            .handle_intent("deleteEvent", &json!({"eventId": "new"}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(deleted.response_type, "calendarEventDeleted");
        assert_eq!(deleted.payload["deleted"], json!(true));
    }

    #[tokio::test]
    async fn test_update_needs_changes() {
        let (module, _) = calendar(FakeGraph::new()).await;
        let err = module
            .handle_intent("updateEvent", &json!({"eventId": "e1"}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.context()["originalError"], json!("missing required entity 'changes'"));

        let ok = module
            .handle_intent(
                "updateEvent",
                &json!({"eventId": "e1", "changes": {"subject": "Moved"}}),
                &IntentContext::new(),
            )
            .await
            .unwrap();
        assert_eq!(ok.response_type, "calendarEventUpdated");
    }

    #[tokio::test]
    async fn test_meeting_times() {
        let (module, _) = calendar(FakeGraph::new().respond(
            GraphOperation::FindMeetingTimes,
            json!({"meetingTimeSuggestions": [], "emptySuggestionsReason": "AttendeesUnavailable"}),
        ))
        .await;
        let response = module
            .handle_intent("findMeetingTimes", &json!({}), &IntentContext::new())
            .await
            .unwrap();
        assert_eq!(response.item_count(), Some(0));
        assert_eq!(
            response.payload["emptySuggestionsReason"],
            json!("AttendeesUnavailable")
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_wrapped() {
        let (module, _) = calendar(FakeGraph::new().fail(GraphOperation::ListEvents, 500)).await;
        let err = module
            .handle_intent("getEvents", &json!({}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrappedFailure);
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.context()["status"], json!(500));
    }

    #[tokio::test]
    async fn test_unknown_intent() {
        let (module, _) = calendar(FakeGraph::new()).await;
        let err = module
            .handle_intent("sendMail", &json!({}), &IntentContext::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedIntent);
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.category(), &ErrorCategory::Calendar);
    }
}
