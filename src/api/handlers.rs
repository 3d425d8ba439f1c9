use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::models::{error_response, ApiError, HealthResponse};
use crate::error::ContextError;
use crate::metrics::METRICS;
use crate::narrator::{
    ContinueRequest, Narrator, OpeningRequest, OpeningResult, SummaryRequest, SummaryResult, TurnResult,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub narrator: Arc<Narrator>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn reject(operation: &str, e: ContextError) -> (StatusCode, Json<ApiError>) {
    let (status, body) = error_response(&e);
    if status.is_server_error() {
        error!("{} failed: {}", operation, e);
    } else {
        warn!("{} rejected: {}", operation, e);
    }
    (status, Json(body))
}

/// Narrate one player turn
///
/// POST /api/v1/conversation/continue
pub async fn continue_conversation(
    State(state): State<AppState>,
    Json(request): Json<ContinueRequest>,
) -> ApiResult<TurnResult> {
    info!(
        "Continue request: story={}, history={} turns, session={:?}",
        request.story.title,
        request.conversation_history.len(),
        request.session_id
    );

    state
        .narrator
        .continue_conversation(request)
        .await
        .map(Json)
        .map_err(|e| reject("continue_conversation", e))
}

/// Start a new story
///
/// POST /api/v1/conversation/opening
pub async fn opening_scene(
    State(state): State<AppState>,
    Json(request): Json<OpeningRequest>,
) -> ApiResult<OpeningResult> {
    info!("Opening scene request: story={}", request.story.title);

    state
        .narrator
        .opening_scene(request)
        .await
        .map(Json)
        .map_err(|e| reject("opening_scene", e))
}

/// Summarize a finished story
///
/// POST /api/v1/conversation/summary
pub async fn story_summary(
    State(state): State<AppState>,
    Json(request): Json<SummaryRequest>,
) -> ApiResult<SummaryResult> {
    info!("Story summary request: story={}", request.story.title);

    state
        .narrator
        .story_summary(request)
        .await
        .map(Json)
        .map_err(|e| reject("story_summary", e))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.narrator.model().to_string(),
    })
}

/// GET /metrics
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_prometheus(),
    )
}
