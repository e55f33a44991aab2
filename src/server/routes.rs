//! Axum route handlers for the intent hub HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`       — Returns `{"status": "ok", "version": ..., "modules": n}`
//! - `GET  /capabilities` — Every routable intent, sorted
//! - `GET  /modules`      — Registered module summaries
//! - `GET  /modules/:id`  — One module summary
//! - `POST /intents`      — Dispatch `{intent, entities, context?, moduleId?}`
//!
//! Caller identity comes from the `x-user-id`, `x-session-id`, `x-device-id`
//! and `x-trace-id` headers. Failures are returned as `ApiError` JSON only.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::errors::{ApiError, ErrorKind, StructuredError};
use crate::hub::Hub;
use crate::modules::{CallContext, IntentContext, IntentResponse};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const DEVICE_ID_HEADER: &str = "x-device-id";
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/capabilities", get(capabilities_handler))
        .route("/modules", get(list_modules_handler))
        .route("/modules/:id", get(get_module_handler))
        .route("/intents", post(intent_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Error boundary
// ============================================================================

/// A structured error on its way out, reduced to the public projection.
pub struct ErrorResponse {
    status: StatusCode,
    body: ApiError,
}

impl From<StructuredError> for ErrorResponse {
    fn from(error: StructuredError) -> Self {
        Self {
            status: status_for(&error),
            body: error.to_api(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status for an error, by kind and collaborator outcome.
pub fn status_for(error: &StructuredError) -> StatusCode {
    match error.kind() {
        ErrorKind::ModuleNotFound => StatusCode::NOT_FOUND,
        ErrorKind::UnsupportedIntent => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::ModuleInvalid | ErrorKind::DuplicateModule => StatusCode::CONFLICT,
        ErrorKind::MethodNotImplemented => StatusCode::NOT_IMPLEMENTED,
        ErrorKind::WrappedFailure => {
            if error.context().get("invalidInput").and_then(Value::as_bool) == Some(true) {
                return StatusCode::BAD_REQUEST;
            }
            match error.context().get("collaboratorCode").and_then(Value::as_str) {
                Some("invalidRequest") => StatusCode::BAD_REQUEST,
                Some("notFound") => StatusCode::NOT_FOUND,
                Some("authenticationFailed") => StatusCode::UNAUTHORIZED,
                Some("permissionDenied") => StatusCode::FORBIDDEN,
                Some("rateLimited") => StatusCode::TOO_MANY_REQUESTS,
                Some(_) => StatusCode::BAD_GATEWAY,
                None => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
        ErrorKind::RecursionLimit | ErrorKind::General => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "intent-hub",
        "modules": state.hub.registry().len(),
    }))
}

/// GET /capabilities
async fn capabilities_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "capabilities": state.hub.registry().capabilities() }))
}

/// GET /modules
async fn list_modules_handler(State(state): State<AppState>) -> impl IntoResponse {
    let modules = state.hub.registry().summaries();
    Json(json!({ "count": modules.len(), "modules": modules }))
}

/// GET /modules/:id
async fn get_module_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ErrorResponse> {
    let registry = state.hub.registry();
    registry.require(&id).await?;
    let summary = registry
        .summaries()
        .into_iter()
        .find(|s| s.id == id)
        .map(|s| json!(s))
        .unwrap_or(Value::Null);
    Ok(Json(summary))
}

/// Body of `POST /intents`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    pub intent: String,
    #[serde(default)]
    pub entities: Value,
    #[serde(default)]
    pub context: IntentContext,
    /// Bypass resolution and dispatch to this module.
    #[serde(default)]
    pub module_id: Option<String>,
}

/// POST /intents
async fn intent_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IntentRequest>,
) -> Result<Json<IntentResponse>, ErrorResponse> {
    let context = request.context.with_call(call_context(&headers));
    let entities = if request.entities.is_null() {
        json!({})
    } else {
        request.entities
    };

    let response = match request.module_id.as_deref() {
        Some(module_id) => {
            state
                .hub
                .handle_on(module_id, &request.intent, &entities, &context)
                .await?
        }
        None => state.hub.handle(&request.intent, &entities, &context).await?,
    };
    Ok(Json(response))
}

/// Actor ids from request headers.
pub fn call_context(headers: &HeaderMap) -> CallContext {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    CallContext {
        user_id: header(USER_ID_HEADER),
        session_id: header(SESSION_ID_HEADER),
        device_id: header(DEVICE_ID_HEADER),
        trace_id: header(TRACE_ID_HEADER),
    }
}
