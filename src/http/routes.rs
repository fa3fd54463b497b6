use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        // Media engine surface
        .route(
            "/sessions/:session_id/events",
            post(handlers::post_event),
        )
        .route("/sessions/:session_id/audio", post(handlers::post_audio))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
