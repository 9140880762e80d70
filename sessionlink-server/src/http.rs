//! SessionLink HTTP API
//!
//! Axum server that runs agent turns and, in local development, serves session
//! CRUD from the in-memory backend.
//!
//! Architecture: each endpoint has a thin axum handler that delegates to an
//! inner function returning `(StatusCode, Value)`. The inner functions are
//! directly testable without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /, /health     - status plus LLM info
//! - GET  /list-apps     - the single app name
//! - POST /run, /api/run - run one turn, return its events
//! - /api/apps/... and /apps/... - session CRUD (in-memory backend only)

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use sessionlink_core::config::ServerConfig;
use sessionlink_core::convert::{session_to_wire, wire_to_event};
use sessionlink_core::{SessionBackend, SessionService, StoreError};
use tokio::net::TcpListener;

use crate::run::{RunOrchestrator, RunRequest, Turn};

pub const REMOTE_CRUD_DETAIL: &str = "Session API is on Session Service";

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub backend: SessionBackend,
    pub orchestrator: RunOrchestrator,
    pub app_name: String,
    pub llm_info: Value,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .route("/list-apps", get(list_apps_handler))
        .route("/run", post(run_handler))
        .route("/api/run", post(run_handler))
        .merge(session_routes("/api"))
        .merge(session_routes(""))
        .with_state(state)
}

fn session_routes(prefix: &str) -> Router<Arc<HttpState>> {
    let sessions = format!("{prefix}/apps/:app_name/users/:user_id/sessions");
    Router::new()
        .route(
            &sessions,
            get(list_sessions_handler).post(create_session_handler),
        )
        .route(
            &format!("{sessions}/:session_id"),
            get(get_session_handler)
                .post(create_session_with_id_handler)
                .delete(delete_session_handler),
        )
        .route(
            &format!("{sessions}/:session_id/events"),
            post(append_event_handler),
        )
}

/// Serve on the configured address until `shutdown` resolves.
pub async fn start_http_server<F>(
    state: Arc<HttpState>,
    config: &ServerConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("SessionLink HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub fn health_inner(llm_info: &Value) -> Value {
    json!({ "status": "ok", "llm": llm_info })
}

pub fn list_apps_inner(app_name: &str) -> Value {
    json!([app_name])
}

/// Inner run - executes one turn; any failure is a single 500.
pub async fn run_inner(orchestrator: &RunOrchestrator, req: RunRequest) -> (StatusCode, Value) {
    let turn = Turn::from_request(req);
    let user_id = turn.user_id.clone();
    let session_id = turn.session_id.clone();

    match orchestrator.run_turn(turn).await {
        Ok(events) => match serde_json::to_value(&events) {
            Ok(body) => (StatusCode::OK, body),
            Err(e) => detail(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        },
        Err(e) => {
            tracing::error!(user_id = %user_id, session_id = %session_id, error = ?e, "run failed");
            detail(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

pub async fn list_sessions_inner(
    backend: &SessionBackend,
    app_name: &str,
    user_id: &str,
) -> (StatusCode, Value) {
    if let Some(rejected) = remote_guard(backend) {
        return rejected;
    }
    match backend.service().list_sessions(app_name, user_id).await {
        Ok(sessions) => {
            let body: Vec<Value> = sessions
                .iter()
                .map(|s| to_json(&session_to_wire(s)))
                .collect();
            (StatusCode::OK, Value::Array(body))
        }
        Err(e) => store_error(&e),
    }
}

/// Inner create - body is optional JSON `{state?, events?}`.
pub async fn create_session_inner(
    backend: &SessionBackend,
    app_name: &str,
    user_id: &str,
    session_id: Option<&str>,
    body: &[u8],
) -> (StatusCode, Value) {
    if let Some(rejected) = remote_guard(backend) {
        return rejected;
    }

    let body: Value = if body.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return detail(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")),
        }
    };
    let state = body
        .get("state")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    let service = backend.service();
    let mut session = match service
        .create_session(app_name, user_id, state, session_id)
        .await
    {
        Ok(s) => s,
        Err(e) => return store_error(&e),
    };

    let initial = body.get("events").and_then(Value::as_array);
    for event in initial.into_iter().flatten().filter_map(wire_to_event) {
        match service.append_event(&session, &event).await {
            Ok(stored) => session.apply_event(stored),
            Err(e) => return store_error(&e),
        }
    }

    (StatusCode::OK, to_json(&session_to_wire(&session)))
}

pub async fn get_session_inner(
    backend: &SessionBackend,
    app_name: &str,
    user_id: &str,
    session_id: &str,
) -> (StatusCode, Value) {
    if let Some(rejected) = remote_guard(backend) {
        return rejected;
    }
    match backend
        .service()
        .get_session(app_name, user_id, session_id)
        .await
    {
        Ok(session) => (StatusCode::OK, to_json(&session_to_wire(&session))),
        Err(e) => store_error(&e),
    }
}

pub async fn delete_session_inner(
    backend: &SessionBackend,
    app_name: &str,
    user_id: &str,
    session_id: &str,
) -> (StatusCode, Value) {
    if let Some(rejected) = remote_guard(backend) {
        return rejected;
    }
    match backend
        .service()
        .delete_session(app_name, user_id, session_id)
        .await
    {
        Ok(()) => (StatusCode::OK, Value::Null),
        Err(e) => store_error(&e),
    }
}

/// Inner append - the body is one wire event. 204 on success.
pub async fn append_event_inner(
    backend: &SessionBackend,
    app_name: &str,
    user_id: &str,
    session_id: &str,
    body: Value,
) -> (StatusCode, Value) {
    if let Some(rejected) = remote_guard(backend) {
        return rejected;
    }
    let Some(event) = wire_to_event(&body) else {
        return detail(StatusCode::BAD_REQUEST, "invalid event payload");
    };

    let service = backend.service();
    let session = match service.get_session(app_name, user_id, session_id).await {
        Ok(s) => s,
        Err(e) => return store_error(&e),
    };
    match service.append_event(&session, &event).await {
        Ok(_) => (StatusCode::NO_CONTENT, Value::Null),
        Err(e) => store_error(&e),
    }
}

// ============================================================================
// Axum handler wrappers (thin - delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(health_inner(&state.llm_info)))
}

pub async fn list_apps_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(list_apps_inner(&state.app_name)))
}

pub async fn run_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<RunRequest>,
) -> impl IntoResponse {
    let (status, body) = run_inner(&state.orchestrator, req).await;
    (status, Json(body))
}

pub async fn list_sessions_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let (status, body) = list_sessions_inner(&state.backend, &app_name, &user_id).await;
    (status, Json(body))
}

pub async fn create_session_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id)): Path<(String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) =
        create_session_inner(&state.backend, &app_name, &user_id, None, &body).await;
    (status, Json(body))
}

pub async fn create_session_with_id_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Bytes,
) -> impl IntoResponse {
    let (status, body) =
        create_session_inner(&state.backend, &app_name, &user_id, Some(&session_id), &body).await;
    (status, Json(body))
}

pub async fn get_session_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let (status, body) = get_session_inner(&state.backend, &app_name, &user_id, &session_id).await;
    (status, Json(body))
}

pub async fn delete_session_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let (status, body) =
        delete_session_inner(&state.backend, &app_name, &user_id, &session_id).await;
    (status, Json(body))
}

pub async fn append_event_handler(
    State(state): State<Arc<HttpState>>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let (status, body) =
        append_event_inner(&state.backend, &app_name, &user_id, &session_id, body).await;
    if status == StatusCode::NO_CONTENT {
        return status.into_response();
    }
    (status, Json(body)).into_response()
}

// ============================================================================
// Helpers
// ============================================================================

fn remote_guard(backend: &SessionBackend) -> Option<(StatusCode, Value)> {
    backend
        .is_remote()
        .then(|| detail(StatusCode::NOT_FOUND, REMOTE_CRUD_DETAIL))
}

/// `{"detail": ...}` error body.
pub fn detail(status: StatusCode, message: impl Into<String>) -> (StatusCode, Value) {
    (status, json!({ "detail": message.into() }))
}

fn store_error(e: &StoreError) -> (StatusCode, Value) {
    let status = e
        .status()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    detail(status, e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ============================================================================
// Unit Tests - call inner functions directly
// ============================================================================
