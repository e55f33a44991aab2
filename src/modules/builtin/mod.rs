//! Built-in capability modules backed by the collaboration service.
//!
//! | id         | intents                                                        |
//! |------------|----------------------------------------------------------------|
//! | `calendar` | getEvents, createEvent, updateEvent, deleteEvent, findMeetingTimes |
//! | `mail`     | getMessages, sendMail, searchMail                              |
//! | `people`   | findPeople, getPerson                                          |
//! | `files`    | listFiles, searchFiles, getFile, shareFile                     |

use std::sync::Arc;

use serde_json::Value;

use crate::errors::StructuredError;

use super::error::DispatchFailure;
use super::module_def::{Module, ModuleDependencies, ModuleInit};

/// Implement [`Module`] for a struct holding an `IntentDispatcher` in
/// `dispatcher`. Built-in modules keep the default priority; overrides come
/// from configuration at registration.
macro_rules! impl_dispatch_module {
    ($ty:ty, $name:expr) => {
        #[async_trait::async_trait]
        impl $crate::modules::Module for $ty {
            fn id(&self) -> &str {
                self.dispatcher.module_id()
            }
            fn name(&self) -> &str {
                $name
            }
            fn capabilities(&self) -> &[String] {
                self.dispatcher.capabilities()
            }
            async fn handle_intent(
                &self,
                intent: &str,
                entities: &serde_json::Value,
                context: &$crate::modules::IntentContext,
            ) -> Result<$crate::modules::IntentResponse, $crate::errors::StructuredError> {
                self.dispatcher.dispatch(intent, entities, context).await
            }
        }
    };
}

pub mod calendar;
pub mod files;
pub mod mail;
pub mod people;

pub use calendar::{CalendarIntent, CalendarModule};
pub use files::{FilesIntent, FilesModule};
pub use mail::{MailIntent, MailModule};
pub use people::{PeopleIntent, PeopleModule};

/// Ids of every built-in module, in default registration order.
pub const BUILTIN_MODULE_IDS: &[&str] = &["calendar", "mail", "people", "files"];

/// Construct a built-in module by id. `None` for unknown ids.
pub async fn create_builtin(
    id: &str,
    deps: ModuleDependencies,
) -> Option<Result<Arc<dyn Module>, StructuredError>> {
    async fn boxed<M: ModuleInit + 'static>(
        deps: ModuleDependencies,
    ) -> Result<Arc<dyn Module>, StructuredError> {
        Ok(Arc::new(M::init(deps).await?))
    }

    Some(match id {
        "calendar" => boxed::<CalendarModule>(deps).await,
        "mail" => boxed::<MailModule>(deps).await,
        "people" => boxed::<PeopleModule>(deps).await,
        "files" => boxed::<FilesModule>(deps).await,
        _ => return None,
    })
}

// ============================================================================
// Entity helpers
// ============================================================================

/// First non-blank string among `keys`.
pub(crate) fn entity_str<'a>(entities: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| entities.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Like [`entity_str`] but missing input is a handler failure.
pub(crate) fn require_str<'a>(entities: &'a Value, keys: &[&str]) -> Result<&'a str, DispatchFailure> {
    entity_str(entities, keys).ok_or_else(|| {
        DispatchFailure::invalid_input(format!("missing required entity '{}'", keys[0]))
    })
}

/// Positive integer entity, clamped to `max`, defaulting to `default`.
pub(crate) fn entity_top(entities: &Value, default: u32, max: u32) -> u32 {
    entities
        .get("top")
        .or_else(|| entities.get("limit"))
        .and_then(Value::as_u64)
        .filter(|n| *n > 0)
        .map_or(default, |n| n.min(max as u64) as u32)
}

/// Object entity under the first present key, or the entities themselves.
pub(crate) fn entity_object<'a>(entities: &'a Value, keys: &[&str]) -> &'a Value {
    keys.iter()
        .filter_map(|key| entities.get(*key))
        .find(|v| v.is_object())
        .unwrap_or(entities)
}

/// Items of a collection payload (`{"value": [...]}` or a bare array).
pub(crate) fn collection(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable in-memory graph client.

    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::interfaces::{CollaboratorError, GraphClient, GraphOperation, TimeRange};

    /// Records every call as `(operation, arguments)` and answers from
    /// `responses`; unscripted operations return `{"value": []}`.
    pub struct FakeGraph {
        pub supported: Vec<GraphOperation>,
        pub responses: HashMap<GraphOperation, Result<Value, u16>>,
        pub calls: Mutex<Vec<(GraphOperation, Value)>>,
    }

    impl FakeGraph {
        pub fn new() -> Self {
            Self {
                supported: GraphOperation::ALL.to_vec(),
                responses: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn without(mut self, operation: GraphOperation) -> Self {
            self.supported.retain(|op| *op != operation);
            self
        }

        pub fn respond(mut self, operation: GraphOperation, value: Value) -> Self {
            self.responses.insert(operation, Ok(value));
            self
        }

        pub fn fail(mut self, operation: GraphOperation, status: u16) -> Self {
            self.responses.insert(operation, Err(status));
            self
        }

        pub fn calls_to(&self, operation: GraphOperation) -> Vec<Value> {
            self.calls
                .lock()
                .iter()
                .filter(|(op, _)| *op == operation)
                .map(|(_, args)| args.clone())
                .collect()
        }

        fn answer(&self, operation: GraphOperation, args: Value) -> Result<Value, CollaboratorError> {
            self.calls.lock().push((operation, args));
            match self.responses.get(&operation) {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(404)) => Err(CollaboratorError::NotFound(operation.to_string())),
                Some(Err(status)) => Err(CollaboratorError::Upstream {
                    status: *status,
                    message: "scripted failure".to_string(),
                }),
                None => Ok(json!({"value": []})),
            }
        }
    }

    #[async_trait]
    impl GraphClient for FakeGraph {
        fn name(&self) -> &str {
            "fake"
        }

        fn supported_operations(&self) -> Vec<GraphOperation> {
            self.supported.clone()
        }

        async fn list_events(&self, user: &str, range: &TimeRange, top: u32) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::ListEvents,
                json!({"user": user, "range": range, "top": top}),
            )
        }

        async fn create_event(&self, user: &str, event: &Value) -> Result<Value, CollaboratorError> {
            self.answer(GraphOperation::CreateEvent, json!({"user": user, "event": event}))
        }

        async fn update_event(&self, user: &str, event_id: &str, patch: &Value) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::UpdateEvent,
                json!({"user": user, "eventId": event_id, "patch": patch}),
            )
        }

        async fn delete_event(&self, user: &str, event_id: &str) -> Result<(), CollaboratorError> {
            self.answer(GraphOperation::DeleteEvent, json!({"user": user, "eventId": event_id}))
                .map(|_| ())
        }

        async fn find_meeting_times(&self, user: &str, request: &Value) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::FindMeetingTimes,
                json!({"user": user, "request": request}),
            )
        }

        async fn list_messages(&self, user: &str, folder: &str, top: u32) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::ListMessages,
                json!({"user": user, "folder": folder, "top": top}),
            )
        }

        async fn send_mail(&self, user: &str, message: &Value) -> Result<(), CollaboratorError> {
            self.answer(GraphOperation::SendMail, json!({"user": user, "message": message}))
                .map(|_| ())
        }

        async fn search_messages(&self, user: &str, query: &str, top: u32) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::SearchMessages,
                json!({"user": user, "query": query, "top": top}),
            )
        }

        async fn search_people(&self, user: &str, query: &str, top: u32) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::SearchPeople,
                json!({"user": user, "query": query, "top": top}),
            )
        }

        async fn get_user(&self, id: &str) -> Result<Value, CollaboratorError> {
            self.answer(GraphOperation::GetUser, json!({"id": id}))
        }

        async fn list_drive_items(&self, user: &str, path: Option<&str>) -> Result<Value, CollaboratorError> {
            self.answer(GraphOperation::ListDriveItems, json!({"user": user, "path": path}))
        }

        async fn search_drive_items(&self, user: &str, query: &str) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::SearchDriveItems,
                json!({"user": user, "query": query}),
            )
        }

        async fn get_drive_item(&self, user: &str, item_id: &str) -> Result<Value, CollaboratorError> {
            self.answer(GraphOperation::GetDriveItem, json!({"user": user, "itemId": item_id}))
        }

        async fn create_sharing_link(
            &self,
            user: &str,
            item_id: &str,
            link_type: &str,
            scope: &str,
        ) -> Result<Value, CollaboratorError> {
            self.answer(
                GraphOperation::CreateSharingLink,
                json!({"user": user, "itemId": item_id, "type": link_type, "scope": scope}),
            )
        }
    }
}
