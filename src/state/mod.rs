//! Process-wide application state.
//!
//! Built once at startup and shared with every handler as `Arc<AppState>`.
//! Everything here is either immutable after construction or synchronized
//! (connection counters).

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::realtime::{
    RealtimeError, SharedTranslator, UpstreamConnector, create_connector, create_translator,
};
use crate::core::tools::builtin::{OrderBook, register_builtin_tools};
use crate::core::tools::{ToolError, ToolRegistry};

/// Errors building the application state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Tool registration failed: {0}")]
    Tools(#[from] ToolError),

    #[error("Upstream setup failed: {0}")]
    Upstream(#[from] RealtimeError),
}

/// Why a relay session slot was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionLimitError {
    #[error("global session limit reached")]
    GlobalLimitReached,
    #[error("per-client session limit reached")]
    PerIpLimitReached,
}

/// Shared state for all handlers.
pub struct AppState {
    pub config: ServerConfig,
    /// Tools every session may call
    pub tools: Arc<ToolRegistry>,
    /// Orders recorded by the `save_order` tool
    pub orders: OrderBook,
    pub translator: SharedTranslator,
    pub connector: Arc<dyn UpstreamConnector>,
    /// Cancelled on graceful shutdown; ends every active session
    pub shutdown: CancellationToken,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, usize>,
}

impl AppState {
    /// Build the state for a validated configuration, connecting upstream over
    /// WebSocket.
    pub fn new(config: ServerConfig) -> Result<Arc<Self>, StateError> {
        let api_key = config
            .upstream_api_key()
            .map_err(StateError::Config)?
            .to_string();
        let connector = create_connector(
            config.upstream_provider,
            &config.upstream_url,
            &config.upstream_model,
            &api_key,
            config.handshake_timeout(),
        )?;
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build the state with a caller-supplied upstream connector.
    pub fn with_connector(
        config: ServerConfig,
        connector: Arc<dyn UpstreamConnector>,
    ) -> Result<Arc<Self>, StateError> {
        let orders = OrderBook::new();
        let mut tools = ToolRegistry::new();
        register_builtin_tools(&mut tools, orders.clone())?;

        let translator = create_translator(config.upstream_provider, config.input_sample_rate);

        info!(
            provider = %config.upstream_provider,
            model = %config.upstream_model,
            tools = tools.len(),
            "Application state initialized"
        );

        Ok(Arc::new(Self {
            config,
            tools: Arc::new(tools),
            orders,
            translator,
            connector,
            shutdown: CancellationToken::new(),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        }))
    }

    /// Reserve a WebSocket slot for `ip`.
    ///
    /// Every successful call must be paired with [`AppState::release_connection`].
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        if let Some(max) = self.config.max_websocket_connections {
            let reserved = self
                .ws_connections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                    (current < max).then_some(current + 1)
                });
            if reserved.is_err() {
                return Err(ConnectionLimitError::GlobalLimitReached);
            }
        } else {
            self.ws_connections.fetch_add(1, Ordering::SeqCst);
        }

        let per_ip_limit = self.config.max_connections_per_ip as usize;
        let mut count = self.ip_connections.entry(ip).or_insert(0);
        if *count >= per_ip_limit {
            drop(count);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *count += 1;
        Ok(())
    }

    /// Release a slot reserved by [`AppState::try_acquire_connection`].
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_sub(1)
            });
        self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn ip_connection_count(&self, ip: &IpAddr) -> usize {
        self.ip_connections.get(ip).map(|count| *count).unwrap_or(0)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("provider", &self.config.upstream_provider)
            .field("tools", &self.tools.len())
            .field("ws_connections", &self.ws_connection_count())
            .finish_non_exhaustive()
    }
}
