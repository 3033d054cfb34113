//! HTTP API.
//!
//! - GET  /              liveness message
//! - GET  /health        uptime and conversation count
//! - GET  /providers     declared providers
//! - POST /query         streamed plain-text answer
//! - POST /query/events  streamed answer as server-sent events

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::chat::{Orchestrator, Reply};
use crate::error::{GatewayError, ValidationError};
use crate::llm::registry::ProviderStatus;
use crate::llm::ModelRegistry;
use crate::server::streaming::{sse_stream, text_body};

/// Body returned by `GET /`.
pub const LIVENESS_MESSAGE: &str = "Hello World! FastAPI is working.";

/// Application state shared across handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub registry: Arc<ModelRegistry>,
    pub default_thread_id: String,
    pub start_time: Instant,
}

/// Build the axum router with all API routes.
///
/// `max_concurrent_requests` bounds in-flight handlers across every route
/// together.
pub fn build_router(state: Arc<AppState>, max_concurrent_requests: usize) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/providers", get(list_providers))
        .route("/query", post(query))
        .route("/query/events", post(query_events))
        .with_state(state)
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent_requests))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Query request body.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    /// Conversation to continue; the configured default when absent.
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    #[serde(rename = "Message")]
    pub message: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub provider: String,
    pub conversations: usize,
}

#[derive(Debug, Serialize)]
pub struct ProviderList {
    pub default: String,
    pub providers: Vec<ProviderStatus>,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: LIVENESS_MESSAGE,
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        provider: state.orchestrator.provider().to_string(),
        conversations: state.orchestrator.store().conversation_count().await,
    })
}

async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProviderList> {
    Json(ProviderList {
        default: state.orchestrator.provider().to_string(),
        providers: state.registry.providers(),
    })
}

async fn query(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let (_, reply) = start_reply(&state, payload).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        text_body(reply.events),
    )
        .into_response())
}

async fn query_events(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Response, GatewayError> {
    let (request_id, reply) = start_reply(&state, payload).await?;
    let stream = sse_stream(reply.events, request_id);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

// ─── Helpers ───────────────────────────────────────────────────────────────

/// Validate the body and start a turn; errors here become JSON error responses.
async fn start_reply(
    state: &AppState,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<(String, Reply), GatewayError> {
    let request = validate(payload)?;
    let request_id = Uuid::new_v4().to_string();
    let thread_id = request
        .thread_id
        .unwrap_or_else(|| state.default_thread_id.clone());

    info!(
        request_id = %request_id,
        thread_id = %thread_id,
        query_chars = request.query.len(),
        "Query request"
    );

    match state.orchestrator.respond(&thread_id, request.query).await {
        Ok(reply) => Ok((request_id, reply)),
        Err(e) => {
            error!(
                request_id = %request_id,
                thread_id = %thread_id,
                error = %e,
                "Query failed before streaming"
            );
            Err(e.into())
        }
    }
}

fn validate(payload: Result<Json<QueryRequest>, JsonRejection>) -> Result<QueryRequest, ValidationError> {
    let Json(request) = payload.map_err(|rejection| ValidationError::Body {
        status: rejection.status().as_u16(),
        message: rejection.body_text(),
    })?;

    if request.query.trim().is_empty() {
        return Err(ValidationError::EmptyQuery);
    }
    if matches!(request.thread_id.as_deref(), Some(id) if id.trim().is_empty()) {
        return Err(ValidationError::EmptyThreadId);
    }
    Ok(request)
}
