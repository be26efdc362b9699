use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the HTTP API router
///
/// - `GET /` health check
/// - `GET /tools` tool declarations sent upstream
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(api::health_check))
        .route("/tools", get(api::list_tools))
        .layer(TraceLayer::new_for_http())
}
