//! Relay WebSocket route configuration

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws/audio` - WebSocket upgrade for a duplex audio relay session
///
/// # Protocol
///
/// After the upgrade the relay connects the configured upstream and announces the
/// session persona, modalities and tools. The client then streams binary PCM audio
/// and may send text turns; model audio comes back as binary frames and model text
/// as text frames. Either side closing ends the session.
///
/// Every attempt on the route reserves a session slot first, so the router must be
/// served with connect info.
pub fn create_realtime_router(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/audio", get(realtime_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            connection_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
