use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::metrics::stream;
use crate::AppState;

/// Builds the read-only status `Router` served alongside a sweep.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(stream::get_status))
        .route("/api/status/latest", get(stream::get_latest))
        .route("/api/status/stream", get(stream::status_stream))
        .with_state(state)
        .layer(CorsLayer::permissive())
}
