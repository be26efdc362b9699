//! Duplex relay session.
//!
//! One [`DuplexSession`] pairs one client connection with one upstream
//! connection. After the handshake it races two loops:
//!
//! - **outbound**: client frames are encoded and written upstream
//! - **inbound**: upstream frames are decoded; text and audio go to the client,
//!   tool call batches are dispatched locally and answered upstream before the
//!   next upstream frame is read
//!
//! Whichever loop ends first wins the `select!`; the other is dropped at its
//! pending await, then both connections are closed exactly once.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::transport::{ClientFrame, ClientSink, ClientSource};
use crate::core::realtime::{
    HandshakeReply, InboundEvent, RealtimeError, RealtimeResult, SessionSettings,
    SharedTranslator, UpstreamLink, UpstreamSink, UpstreamSource, WireMessage,
};
use crate::core::tools::{ToolCall, ToolRegistry};

/// Default time allowed for the upstream to acknowledge the setup message.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Why an active session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// Client closed the connection or sent an empty audio frame
    ClientClosed,
    /// No client frame within the idle timeout
    IdleTimeout,
    UpstreamClosed,
    ClientFault(String),
    UpstreamFault(String),
    /// Server shutdown
    Shutdown,
}

impl EndReason {
    /// Whether the session ended because a connection failed.
    pub fn is_fault(&self) -> bool {
        matches!(self, EndReason::ClientFault(_) | EndReason::UpstreamFault(_))
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::ClientClosed => write!(f, "client closed"),
            EndReason::IdleTimeout => write!(f, "client idle"),
            EndReason::UpstreamClosed => write!(f, "upstream closed"),
            EndReason::ClientFault(e) => write!(f, "client fault: {e}"),
            EndReason::UpstreamFault(e) => write!(f, "upstream fault: {e}"),
            EndReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub session_id: String,
    pub end_reason: EndReason,
    /// Client frames forwarded upstream
    pub frames_in: u64,
    /// Frames delivered to the client
    pub frames_out: u64,
    /// Tool calls answered
    pub tool_calls: u64,
}

/// Per-session timing knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub handshake_timeout: Duration,
    /// End the session when the client sends nothing for this long
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            idle_timeout: None,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    frames_in: AtomicU64,
    frames_out: AtomicU64,
    tool_calls: AtomicU64,
}

/// Serializes every write to the upstream.
///
/// Both loops write upstream; a tool batch is written under one lock
/// acquisition so audio frames never land between its messages.
struct UpstreamWriter {
    sink: Mutex<Box<dyn UpstreamSink>>,
    closed: AtomicBool,
}

impl UpstreamWriter {
    fn new(sink: Box<dyn UpstreamSink>) -> Self {
        Self {
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
        }
    }

    async fn send(&self, message: WireMessage) -> RealtimeResult<()> {
        self.send_batch(vec![message]).await
    }

    async fn send_batch(&self, messages: Vec<WireMessage>) -> RealtimeResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RealtimeError::NotConnected);
        }
        let mut sink = self.sink.lock().await;
        for message in messages {
            sink.send(message).await?;
        }
        Ok(())
    }

    async fn close_once(&self) -> RealtimeResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sink.lock().await.close().await
    }
}

/// A relay session between one client and one upstream connection.
pub struct DuplexSession {
    id: String,
    settings: SessionSettings,
    translator: SharedTranslator,
    tools: Arc<ToolRegistry>,
    options: SessionOptions,
    shutdown: CancellationToken,
    state: watch::Sender<SessionState>,
    counters: Counters,
}

impl DuplexSession {
    pub fn new(
        settings: SessionSettings,
        translator: SharedTranslator,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Connecting);
        Self {
            id: Uuid::new_v4().to_string(),
            settings,
            translator,
            tools,
            options: SessionOptions::default(),
            shutdown: CancellationToken::new(),
            state,
            counters: Counters::default(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// End the session when `token` is cancelled.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Observe state transitions. The receiver keeps the final state after the
    /// session is gone.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        debug!(session_id = %self.id, from = %previous, to = %next, "Session state change");
    }

    /// Run the session to completion.
    ///
    /// Returns an error only when the handshake fails; once active, the session
    /// always ends with a [`SessionReport`]. Both connections are closed before
    /// this returns on every path.
    pub async fn run(
        self,
        mut client_sink: Box<dyn ClientSink>,
        mut client_source: Box<dyn ClientSource>,
        upstream: UpstreamLink,
    ) -> RealtimeResult<SessionReport> {
        let UpstreamLink {
            sink: upstream_sink,
            source: mut upstream_source,
        } = upstream;
        let upstream_sink = UpstreamWriter::new(upstream_sink);

        info!(
            session_id = %self.id,
            binding = self.translator.binding(),
            model = %self.settings.model,
            tools = self.settings.tools.len(),
            "Starting relay session"
        );

        if let Err(e) = self
            .handshake(&upstream_sink, upstream_source.as_mut())
            .await
        {
            error!(session_id = %self.id, "Upstream handshake failed: {}", e);
            self.close_both(client_sink.as_mut(), &upstream_sink).await;
            self.transition(SessionState::Closed);
            return Err(e);
        }

        self.transition(SessionState::Active);
        info!(session_id = %self.id, "Relay session active");

        let end_reason = tokio::select! {
            reason = self.outbound(client_source.as_mut(), &upstream_sink) => reason,
            reason = self.inbound(upstream_source.as_mut(), client_sink.as_mut(), &upstream_sink) => reason,
            _ = self.shutdown.cancelled() => EndReason::Shutdown,
        };

        self.transition(SessionState::Draining);
        self.close_both(client_sink.as_mut(), &upstream_sink).await;
        self.transition(SessionState::Closed);

        let report = SessionReport {
            session_id: self.id.clone(),
            end_reason,
            frames_in: self.counters.frames_in.load(Ordering::Relaxed),
            frames_out: self.counters.frames_out.load(Ordering::Relaxed),
            tool_calls: self.counters.tool_calls.load(Ordering::Relaxed),
        };

        if report.end_reason.is_fault() {
            warn!(
                session_id = %report.session_id,
                reason = %report.end_reason,
                frames_in = report.frames_in,
                frames_out = report.frames_out,
                tool_calls = report.tool_calls,
                "Relay session ended"
            );
        } else {
            info!(
                session_id = %report.session_id,
                reason = %report.end_reason,
                frames_in = report.frames_in,
                frames_out = report.frames_out,
                tool_calls = report.tool_calls,
                "Relay session ended"
            );
        }

        Ok(report)
    }

    async fn handshake(
        &self,
        upstream_sink: &UpstreamWriter,
        upstream_source: &mut dyn UpstreamSource,
    ) -> RealtimeResult<()> {
        let setup = self.translator.build_handshake(&self.settings)?;
        upstream_sink.send(setup).await?;

        let wait_for_reply = async {
            loop {
                let Some(frame) = upstream_source.recv().await? else {
                    return Err(RealtimeError::ConnectionFailed(
                        "upstream closed during handshake".to_string(),
                    ));
                };
                match self.translator.decode_handshake_reply(&frame) {
                    Ok(HandshakeReply::Accepted) => return Ok(()),
                    Ok(HandshakeReply::Rejected(reason)) => {
                        return Err(RealtimeError::HandshakeRejected(reason));
                    }
                    Ok(HandshakeReply::Pending) => {
                        debug!(session_id = %self.id, "Waiting for setup acknowledgment");
                    }
                    Err(e) => {
                        warn!(session_id = %self.id, "Skipping malformed handshake frame: {}", e);
                    }
                }
            }
        };

        tokio::select! {
            result = timeout(self.options.handshake_timeout, wait_for_reply) => {
                result.map_err(|_| RealtimeError::Timeout(format!(
                    "no setup acknowledgment within {:?}",
                    self.options.handshake_timeout
                )))?
            }
            _ = self.shutdown.cancelled() => Err(RealtimeError::ConnectionFailed(
                "server shutting down".to_string(),
            )),
        }
    }

    /// Client to upstream. Each write is awaited before the next client read.
    async fn outbound(
        &self,
        client_source: &mut dyn ClientSource,
        upstream_sink: &UpstreamWriter,
    ) -> EndReason {
        loop {
            let next = match self.options.idle_timeout {
                Some(limit) => match timeout(limit, client_source.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        info!(session_id = %self.id, "Client idle for {:?}", limit);
                        return EndReason::IdleTimeout;
                    }
                },
                None => client_source.recv().await,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(session_id = %self.id, "Client disconnected");
                    return EndReason::ClientClosed;
                }
                Err(e) => return EndReason::ClientFault(e.to_string()),
            };

            let encoded = match frame {
                ClientFrame::Audio(data) if data.is_empty() => {
                    info!(session_id = %self.id, "Client sent an empty frame, ending session");
                    return EndReason::ClientClosed;
                }
                ClientFrame::Audio(data) => self
                    .translator
                    .encode_client_audio(&data)
                    .map(|message| vec![message]),
                ClientFrame::Text(text) if text.trim().is_empty() => continue,
                ClientFrame::Text(text) => self.translator.encode_client_text(&text),
            };

            let messages = match encoded {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(session_id = %self.id, "Dropping client frame: {}", e);
                    continue;
                }
            };

            if let Err(e) = upstream_sink.send_batch(messages).await {
                return EndReason::UpstreamFault(e.to_string());
            }
            self.counters.frames_in.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Upstream to client, answering tool call batches in place.
    async fn inbound(
        &self,
        upstream_source: &mut dyn UpstreamSource,
        client_sink: &mut dyn ClientSink,
        upstream_sink: &UpstreamWriter,
    ) -> EndReason {
        loop {
            let frame = match upstream_source.recv().await {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!(session_id = %self.id, "Upstream closed the session");
                    return EndReason::UpstreamClosed;
                }
                Err(e) if e.is_transport_fault() => {
                    error!(session_id = %self.id, "Upstream transport error: {}", e);
                    return EndReason::UpstreamFault(e.to_string());
                }
                Err(e) => {
                    warn!(session_id = %self.id, "Dropping upstream frame: {}", e);
                    continue;
                }
            };

            let events = match self.translator.decode_upstream(&frame) {
                Ok(events) => events,
                Err(e) => {
                    warn!(session_id = %self.id, "Dropping malformed upstream frame: {}", e);
                    continue;
                }
            };

            for event in events {
                let delivered = match event {
                    InboundEvent::Text(text) => client_sink.send_text(text).await,
                    InboundEvent::Audio(data) => client_sink.send_binary(data).await,
                    InboundEvent::ToolCalls(calls) => {
                        match self.answer_tool_calls(&calls, upstream_sink).await {
                            Ok(()) => continue,
                            Err(e) => return EndReason::UpstreamFault(e.to_string()),
                        }
                    }
                };
                if let Err(e) = delivered {
                    return EndReason::ClientFault(e.to_string());
                }
                self.counters.frames_out.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Dispatch every call of one batch and send the joint reply.
    async fn answer_tool_calls(
        &self,
        calls: &[ToolCall],
        upstream_sink: &UpstreamWriter,
    ) -> RealtimeResult<()> {
        let results: Vec<_> = calls
            .iter()
            .map(|call| {
                let result = self.tools.dispatch(call);
                info!(
                    session_id = %self.id,
                    tool = %call.name,
                    call_id = %call.id,
                    status = result.status().unwrap_or("ok"),
                    "Tool call answered"
                );
                result
            })
            .collect();
        self.counters
            .tool_calls
            .fetch_add(results.len() as u64, Ordering::Relaxed);

        // An unanswered batch stalls the upstream turn, so the session ends instead
        let messages = self
            .translator
            .encode_tool_batch(&results)
            .inspect_err(|e| {
                error!(session_id = %self.id, "Failed to encode tool results: {}", e);
            })?;
        upstream_sink.send_batch(messages).await
    }

    async fn close_both(&self, client_sink: &mut dyn ClientSink, upstream_sink: &UpstreamWriter) {
        if let Err(e) = client_sink.close().await {
            debug!(session_id = %self.id, "Client close failed: {}", e);
        }
        if let Err(e) = upstream_sink.close_once().await {
            debug!(session_id = %self.id, "Upstream close failed: {}", e);
        }
    }
}

impl fmt::Debug for DuplexSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexSession")
            .field("id", &self.id)
            .field("binding", &self.translator.binding())
            .field("state", &self.state())
            .field("options", &self.options)
            .finish()
    }
}
