//! HTTP API.
//!
//! | Method & Path | Body | Response |
//! |---|---|---|
//! | `POST /start_analysis` | `{task, iteration_count?}` | `{session_id}` |
//! | `GET /analysis_status/{session_id}` | | session document |
//! | `POST /update_system_prompt` | `{session_id, new_prompt}` | `{status: "success"}` |
//! | `POST /process_iteration/{session_id}` | | `{status: "success"}` |
//!
//! Errors come back as `{"detail": "..."}` with 404 for unknown sessions and
//! 500 for everything else.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::processor::IterationProcessor;
use crate::store::SessionStore;
use crate::types::Session;
use crate::Error;

/// Iteration count assumed when a start request leaves it out.
pub const DEFAULT_ITERATION_COUNT: u32 = 5;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub processor: Arc<IterationProcessor>,
}

impl AppState {
    pub fn new(processor: IterationProcessor) -> Self {
        Self {
            store: processor.store().clone(),
            processor: Arc::new(processor),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartAnalysisRequest {
    pub task: String,
    #[serde(default)]
    pub iteration_count: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartAnalysisResponse {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SystemPromptUpdate {
    pub session_id: String,
    pub new_prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    fn success() -> Self {
        Self {
            status: "success".to_string(),
        }
    }
}

/// Error wrapper that renders as `{"detail": ...}`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self.0 {
            Error::SessionNotFound(_) => (StatusCode::NOT_FOUND, "Session not found".to_string()),
            Error::Llm(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Claude API error: {}", msg),
            ),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Build the router with CORS open to any origin.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/start_analysis", post(start_analysis))
        .route("/analysis_status/{session_id}", get(analysis_status))
        .route("/update_system_prompt", post(update_system_prompt))
        .route("/process_iteration/{session_id}", post(process_iteration))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> crate::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "API listening");
    }
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn start_analysis(
    State(state): State<AppState>,
    Json(request): Json<StartAnalysisRequest>,
) -> ApiResult<StartAnalysisResponse> {
    let iteration_count = request
        .iteration_count
        .unwrap_or(DEFAULT_ITERATION_COUNT);
    let session_id = state.store.create(&request.task, iteration_count).await?;
    Ok(Json(StartAnalysisResponse { session_id }))
}

async fn analysis_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Session> {
    match state.store.read(&session_id).await {
        Ok(session) => {
            tracing::debug!(session_id = %session_id, "Retrieved analysis status");
            Ok(Json(session))
        }
        Err(e) => {
            tracing::info!(session_id = %session_id, error = %e, "Status lookup failed");
            Err(e.into())
        }
    }
}

async fn update_system_prompt(
    State(state): State<AppState>,
    Json(update): Json<SystemPromptUpdate>,
) -> ApiResult<StatusResponse> {
    state
        .store
        .update_system_prompt(&update.session_id, &update.new_prompt)
        .await?;
    Ok(Json(StatusResponse::success()))
}

async fn process_iteration(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<StatusResponse> {
    state.processor.process_detached(&session_id).await?;
    Ok(Json(StatusResponse::success()))
}
