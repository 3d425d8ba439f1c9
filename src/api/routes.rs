use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::{self, AppState};

/// Build the service router
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let conversation_routes = Router::new()
        .route("/api/v1/conversation/continue", post(handlers::continue_conversation))
        .route("/api/v1/conversation/opening", post(handlers::opening_scene))
        .route("/api/v1/conversation/summary", post(handlers::story_summary))
        .layer(RequestBodyLimitLayer::new(max_body_bytes));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .merge(conversation_routes)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
