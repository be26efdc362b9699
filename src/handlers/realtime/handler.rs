//! Realtime WebSocket handler
//!
//! Accepts a client WebSocket on `/ws/audio`, connects the configured upstream and
//! runs one [`DuplexSession`] until either side ends it.

use axum::{
    Extension,
    extract::{
        State,
        ws::{WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::session::{DuplexSession, SessionOptions};
use super::transport::{ClientSink, split_socket};
use crate::middleware::ClientIp;
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Releases a connection-limit slot when the connection ends, however it ends.
struct ConnectionGuard {
    state: Arc<AppState>,
    ip: IpAddr,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.release_connection(self.ip);
    }
}

/// Realtime WebSocket handler
///
/// Upgrades the HTTP connection to WebSocket for audio relay. The `ClientIp`
/// extension is present when the connection-limit middleware reserved a slot for
/// this request; the slot is handed to the socket task and released when it ends.
///
/// # Arguments
/// * `ws` - The WebSocket upgrade request from Axum
/// * `state` - Application state
/// * `client_ip` - Reserved connection slot, if any
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    client_ip: Option<Extension<ClientIp>>,
) -> Response {
    let guard = client_ip.map(|Extension(ClientIp(ip))| ConnectionGuard {
        state: state.clone(),
        ip,
    });

    info!(
        client_ip = ?guard.as_ref().map(|g| g.ip),
        "Relay WebSocket connection upgrade requested"
    );

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move {
            let _guard = guard;
            supervise(socket, state).await;
        })
}

/// Run one relay session over an upgraded socket.
///
/// Every path closes the client socket. The session itself runs in its own task so
/// a panic inside it is contained and logged here.
pub async fn supervise(socket: WebSocket, state: Arc<AppState>) {
    let (mut client_sink, client_source) = split_socket(socket);

    let upstream = match state.connector.connect().await {
        Ok(link) => link,
        Err(e) => {
            error!(
                provider = %state.config.upstream_provider,
                "Failed to connect upstream: {}", e
            );
            if let Err(e) = client_sink.close().await {
                warn!("Failed to close client socket: {}", e);
            }
            return;
        }
    };

    let settings = state.config.session_settings(state.tools.declarations());
    let session = DuplexSession::new(settings, state.translator.clone(), state.tools.clone())
        .with_options(SessionOptions {
            handshake_timeout: state.config.handshake_timeout(),
            idle_timeout: state.config.idle_timeout(),
        })
        .with_shutdown(state.shutdown.child_token());
    let session_id = session.id().to_string();

    let task = tokio::spawn(session.run(
        Box::new(client_sink),
        Box::new(client_source),
        upstream,
    ));

    match task.await {
        Ok(Ok(report)) => {
            info!(
                session_id = %report.session_id,
                end_reason = %report.end_reason,
                "Relay session finished"
            );
        }
        Ok(Err(e)) => {
            warn!(session_id = %session_id, "Relay session failed to start: {}", e);
        }
        Err(e) if e.is_panic() => {
            // Both halves were owned by the task and are dropped with it
            error!(session_id = %session_id, "Relay session panicked");
        }
        Err(e) => {
            warn!(session_id = %session_id, "Relay session task cancelled: {}", e);
        }
    }
}
