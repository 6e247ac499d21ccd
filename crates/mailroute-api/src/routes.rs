//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, send, track};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed));

    // Send routes
    let send_routes = Router::new().route("/", post(send::send_message));

    // Public tracking callbacks. These are hit by mail clients and
    // browsers with no credentials, so they stay outside /api/v1 and
    // allow any origin.
    let track_routes = Router::new()
        .route("/open/:email_id/:hash", get(track::track_open))
        .route("/click/:email_id/:link_hash/:hash", get(track::track_click))
        .layer(CorsLayer::permissive());

    let api_v1 = Router::new().nest("/send", send_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .nest("/track", track_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
