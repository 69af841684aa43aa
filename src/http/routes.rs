use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/:session_id/stop", post(handlers::stop_session))
        .route("/sessions/:session_id/cancel", post(handlers::cancel_session))
        // Session queries
        .route("/sessions/:session_id/status", get(handlers::session_status))
        // App lifecycle signal source
        .route("/lifecycle", post(handlers::lifecycle_change))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // Client apps call the API from a webview
        .layer(CorsLayer::permissive())
        .with_state(state)
}
