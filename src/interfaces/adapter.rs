//! GraphClient trait: the contract for the external collaboration service.
//!
//! Modules never talk HTTP themselves. They receive an `Arc<dyn GraphClient>`
//! in their dependency bag and call the narrow operations they need. A client
//! declares its callable surface through [`GraphClient::supported_operations`]
//! so modules can refuse to start when an operation they rely on is missing;
//! every operation method defaults to [`CollaboratorError::NotImplemented`]
//! for the same reason.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Operations a collaboration-service client may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GraphOperation {
    ListEvents,
    CreateEvent,
    UpdateEvent,
    DeleteEvent,
    FindMeetingTimes,
    ListMessages,
    SendMail,
    SearchMessages,
    SearchPeople,
    GetUser,
    ListDriveItems,
    SearchDriveItems,
    GetDriveItem,
    CreateSharingLink,
}

impl GraphOperation {
    pub const ALL: &'static [GraphOperation] = &[
        Self::ListEvents,
        Self::CreateEvent,
        Self::UpdateEvent,
        Self::DeleteEvent,
        Self::FindMeetingTimes,
        Self::ListMessages,
        Self::SendMail,
        Self::SearchMessages,
        Self::SearchPeople,
        Self::GetUser,
        Self::ListDriveItems,
        Self::SearchDriveItems,
        Self::GetDriveItem,
        Self::CreateSharingLink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListEvents => "listEvents",
            Self::CreateEvent => "createEvent",
            Self::UpdateEvent => "updateEvent",
            Self::DeleteEvent => "deleteEvent",
            Self::FindMeetingTimes => "findMeetingTimes",
            Self::ListMessages => "listMessages",
            Self::SendMail => "sendMail",
            Self::SearchMessages => "searchMessages",
            Self::SearchPeople => "searchPeople",
            Self::GetUser => "getUser",
            Self::ListDriveItems => "listDriveItems",
            Self::SearchDriveItems => "searchDriveItems",
            Self::GetDriveItem => "getDriveItem",
            Self::CreateSharingLink => "createSharingLink",
        }
    }
}

impl fmt::Display for GraphOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional start/end bounds (ISO-8601 strings, passed through verbatim).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// The collaboration-service client.
///
/// `user` is either `"me"` (the signed-in principal) or a user id / UPN.
#[async_trait]
pub trait GraphClient: Send + Sync {
    /// Human-readable client name for logs.
    fn name(&self) -> &str;

    /// The operations this client actually implements.
    fn supported_operations(&self) -> Vec<GraphOperation>;

    fn supports(&self, operation: GraphOperation) -> bool {
        self.supported_operations().contains(&operation)
    }

    // ── Calendar ──

    async fn list_events(
        &self,
        _user: &str,
        _range: &TimeRange,
        _top: u32,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::ListEvents))
    }

    async fn create_event(&self, _user: &str, _event: &Value) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::CreateEvent))
    }

    async fn update_event(
        &self,
        _user: &str,
        _event_id: &str,
        _patch: &Value,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::UpdateEvent))
    }

    async fn delete_event(&self, _user: &str, _event_id: &str) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::DeleteEvent))
    }

    async fn find_meeting_times(
        &self,
        _user: &str,
        _request: &Value,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::FindMeetingTimes))
    }

    // ── Mail ──

    async fn list_messages(
        &self,
        _user: &str,
        _folder: &str,
        _top: u32,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::ListMessages))
    }

    /// `request` is the full sendMail body: `{"message": {...}, "saveToSentItems": bool}`.
    async fn send_mail(&self, _user: &str, _request: &Value) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::SendMail))
    }

    async fn search_messages(
        &self,
        _user: &str,
        _query: &str,
        _top: u32,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::SearchMessages))
    }

    // ── People ──

    async fn search_people(
        &self,
        _user: &str,
        _query: &str,
        _top: u32,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::SearchPeople))
    }

    async fn get_user(&self, _id: &str) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::GetUser))
    }

    // ── Files ──

    async fn list_drive_items(
        &self,
        _user: &str,
        _path: Option<&str>,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::ListDriveItems))
    }

    async fn search_drive_items(&self, _user: &str, _query: &str) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::SearchDriveItems))
    }

    async fn get_drive_item(&self, _user: &str, _item_id: &str) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::GetDriveItem))
    }

    async fn create_sharing_link(
        &self,
        _user: &str,
        _item_id: &str,
        _link_type: &str,
        _scope: &str,
    ) -> Result<Value, CollaboratorError> {
        Err(CollaboratorError::NotImplemented(GraphOperation::CreateSharingLink))
    }
}

/// Failures raised by a collaborator.
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Operation not implemented: {0}")]
    NotImplemented(GraphOperation),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: retry after {0:?}s")]
    RateLimited(Option<u64>),

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CollaboratorError {
    /// Short machine-readable name used in error context.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotImplemented(_) => "notImplemented",
            Self::AuthenticationFailed(_) => "authenticationFailed",
            Self::PermissionDenied(_) => "permissionDenied",
            Self::NotFound(_) => "notFound",
            Self::RateLimited(_) => "rateLimited",
            Self::Upstream { .. } => "upstream",
            Self::Transport(_) => "transport",
            Self::InvalidRequest(_) => "invalidRequest",
            Self::InvalidConfig(_) => "invalidConfig",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CalendarOnly;

    #[async_trait]
    impl GraphClient for CalendarOnly {
        fn name(&self) -> &str {
            "calendar-only"
        }

        fn supported_operations(&self) -> Vec<GraphOperation> {
            vec![GraphOperation::ListEvents]
        }

        async fn list_events(
            &self,
            _user: &str,
            _range: &TimeRange,
            _top: u32,
        ) -> Result<Value, CollaboratorError> {
            Ok(serde_json::json!({"value": []}))
        }
    }

    #[tokio::test]
    async fn test_default_methods_are_not_implemented() {
        let client = CalendarOnly;
        assert!(client.supports(GraphOperation::ListEvents));
        assert!(!client.supports(GraphOperation::SendMail));

        let err = client
            .send_mail("me", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollaboratorError::NotImplemented(GraphOperation::SendMail)
        ));
        assert_eq!(err.code(), "notImplemented");
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(GraphOperation::ALL.len(), 14);
        assert_eq!(GraphOperation::FindMeetingTimes.to_string(), "findMeetingTimes");
    }
}
