//! Session slot reservation for the relay route.
//!
//! Each relay session holds one slot against `max_websocket_connections` and one
//! against `max_connections_per_ip` for its client address. The middleware is
//! attached with `route_layer` to `/ws/audio` only, so every request it sees is a
//! session attempt.
//!
//! A reserved slot reaches [`realtime_handler`](crate::handlers::realtime_handler)
//! as a [`ClientIp`] extension and is released by the socket task when the session
//! ends. An attempt that does not upgrade releases its slot here.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::{AppState, ConnectionLimitError};

/// Client address of a request holding a session slot.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

impl IntoResponse for ConnectionLimitError {
    fn into_response(self) -> Response {
        match self {
            ConnectionLimitError::GlobalLimitReached => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Relay at capacity. Please try again later.",
            )
                .into_response(),
            ConnectionLimitError::PerIpLimitReached => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many relay sessions from your address.",
            )
                .into_response(),
        }
    }
}

/// Reserve a session slot for the caller before the upgrade handler runs.
///
/// Responds 503 when the relay is full and 429 when the client address already
/// holds its share of sessions. The server must be started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(client_ip) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        warn!("Relay request carries no peer address");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Client address unavailable").into_response();
    };

    if let Err(refusal) = state.try_acquire_connection(client_ip) {
        warn!(
            client_ip = %client_ip,
            active_sessions = state.ws_connection_count(),
            reason = %refusal,
            "Refusing relay session"
        );
        return refusal.into_response();
    }

    request.extensions_mut().insert(ClientIp(client_ip));
    let response = next.run(request).await;
    if response.status() != StatusCode::SWITCHING_PROTOCOLS {
        debug!(
            client_ip = %client_ip,
            status = %response.status(),
            "Relay upgrade not completed, releasing session slot"
        );
        state.release_connection(client_ip);
    }
    response
}
