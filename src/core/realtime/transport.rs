//! Upstream WebSocket transport.
//!
//! The session talks to the upstream through [`UpstreamSink`] and
//! [`UpstreamSource`], obtained from an [`UpstreamConnector`]. The production
//! connector opens a `tokio-tungstenite` client connection; tests substitute
//! in-memory implementations.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info};
use url::Url;

use super::base::{RealtimeError, RealtimeResult, WireMessage};

/// Write half of an upstream connection.
#[async_trait]
pub trait UpstreamSink: Send {
    /// Send one text frame.
    async fn send(&mut self, message: WireMessage) -> RealtimeResult<()>;

    /// Send a close frame and flush. Closing twice is not an error.
    async fn close(&mut self) -> RealtimeResult<()>;
}

/// Read half of an upstream connection.
#[async_trait]
pub trait UpstreamSource: Send {
    /// Next text frame, or `None` once the upstream has closed.
    async fn recv(&mut self) -> RealtimeResult<Option<String>>;
}

/// An open upstream connection, split into its two halves.
pub struct UpstreamLink {
    pub sink: Box<dyn UpstreamSink>,
    pub source: Box<dyn UpstreamSource>,
}

impl UpstreamLink {
    pub fn new(sink: impl UpstreamSink + 'static, source: impl UpstreamSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

impl fmt::Debug for UpstreamLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamLink").finish_non_exhaustive()
    }
}

/// Opens upstream connections, one per client session.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self) -> RealtimeResult<UpstreamLink>;
}

// =============================================================================
// WebSocket implementation
// =============================================================================

/// Connects to a realtime endpoint over WebSocket.
#[derive(Clone)]
pub struct WebSocketConnector {
    url: String,
    headers: Vec<(String, String)>,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            connect_timeout,
        }
    }

    /// Add extra request headers (authorization, protocol flags).
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    fn build_request(&self) -> RealtimeResult<http::Request<()>> {
        let url = Url::parse(&self.url)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid upstream URL: {e}")))?;
        let host = match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(RealtimeError::InvalidConfiguration(
                    "upstream URL has no host".to_string(),
                ));
            }
        };

        let mut builder = http::Request::builder()
            .uri(self.url.as_str())
            .header("Sec-WebSocket-Key", tungstenite::handshake::client::generate_key())
            .header("Sec-WebSocket-Version", "13")
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Host", host);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder
            .body(())
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))
    }
}

impl fmt::Debug for WebSocketConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // URL query and header values may carry credentials
        let endpoint = Url::parse(&self.url)
            .map(|u| format!("{}://{}{}", u.scheme(), u.host_str().unwrap_or(""), u.path()))
            .unwrap_or_else(|_| "<invalid>".to_string());
        f.debug_struct("WebSocketConnector")
            .field("endpoint", &endpoint)
            .field("headers", &self.headers.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[async_trait]
impl UpstreamConnector for WebSocketConnector {
    async fn connect(&self) -> RealtimeResult<UpstreamLink> {
        let request = self.build_request()?;

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RealtimeError::Timeout("upstream connect".to_string()))?
                .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        info!("Connected to upstream realtime endpoint");

        let (sink, stream) = ws_stream.split();
        Ok(UpstreamLink::new(WsSink::new(sink), WsSource::new(stream)))
    }
}

/// Upstream write half over any tungstenite sink.
pub struct WsSink<S> {
    inner: S,
    closed: bool,
}

impl<S> WsSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

#[async_trait]
impl<S> UpstreamSink for WsSink<S>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin + Send,
{
    async fn send(&mut self, message: WireMessage) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::NotConnected);
        }
        self.inner
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| RealtimeError::WebSocketError(e.to_string()))
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match self.inner.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(RealtimeError::WebSocketError(e.to_string())),
        }
    }
}

/// Upstream read half over any tungstenite stream.
pub struct WsSource<S> {
    inner: S,
}

impl<S> WsSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> UpstreamSource for WsSource<S>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin + Send,
{
    async fn recv(&mut self) -> RealtimeResult<Option<String>> {
        loop {
            let Some(message) = self.inner.next().await else {
                return Ok(None);
            };
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.to_string())),
                // Gemini delivers JSON in binary frames
                Ok(Message::Binary(data)) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|e| RealtimeError::MalformedFrame(format!("non-UTF-8 frame: {e}")));
                }
                Ok(Message::Close(frame)) => {
                    match frame {
                        Some(frame) => info!(code = %frame.code, reason = %frame.reason, "Upstream closed the connection"),
                        None => info!("Upstream closed the connection"),
                    }
                    return Ok(None);
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    debug!("Skipping upstream control frame");
                }
                Err(tungstenite::Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(RealtimeError::WebSocketError(e.to_string())),
            }
        }
    }
}
