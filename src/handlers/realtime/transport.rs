//! Client transport port and its axum WebSocket adapter.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::core::realtime::{RealtimeError, RealtimeResult};

/// A frame received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Raw PCM audio
    Audio(Bytes),
    /// A typed user turn
    Text(String),
}

/// Read half of a client connection.
#[async_trait]
pub trait ClientSource: Send {
    /// Next frame, or `None` once the client has closed.
    async fn recv(&mut self) -> RealtimeResult<Option<ClientFrame>>;
}

/// Write half of a client connection.
#[async_trait]
pub trait ClientSink: Send {
    async fn send_text(&mut self, text: String) -> RealtimeResult<()>;
    async fn send_binary(&mut self, data: Bytes) -> RealtimeResult<()>;
    /// Send a close frame. Closing twice is not an error.
    async fn close(&mut self) -> RealtimeResult<()>;
}

/// Split an upgraded axum socket into the two client halves.
pub fn split_socket(socket: WebSocket) -> (AxumClientSink, AxumClientSource) {
    let (sender, receiver) = socket.split();
    (
        AxumClientSink {
            inner: sender,
            closed: false,
        },
        AxumClientSource { inner: receiver },
    )
}

pub struct AxumClientSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl ClientSource for AxumClientSource {
    async fn recv(&mut self) -> RealtimeResult<Option<ClientFrame>> {
        loop {
            let Some(message) = self.inner.next().await else {
                return Ok(None);
            };
            match message {
                Ok(Message::Binary(data)) => return Ok(Some(ClientFrame::Audio(data))),
                Ok(Message::Text(text)) => return Ok(Some(ClientFrame::Text(text.to_string()))),
                Ok(Message::Close(_)) => return Ok(None),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    debug!("Skipping client control frame");
                }
                Err(e) => return Err(RealtimeError::ClientTransport(e.to_string())),
            }
        }
    }
}

pub struct AxumClientSink {
    inner: SplitSink<WebSocket, Message>,
    closed: bool,
}

impl AxumClientSink {
    async fn send_message(&mut self, message: Message) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::NotConnected);
        }
        self.inner
            .send(message)
            .await
            .map_err(|e| RealtimeError::ClientTransport(e.to_string()))
    }
}

#[async_trait]
impl ClientSink for AxumClientSink {
    async fn send_text(&mut self, text: String) -> RealtimeResult<()> {
        self.send_message(Message::Text(text.into())).await
    }

    async fn send_binary(&mut self, data: Bytes) -> RealtimeResult<()> {
        self.send_message(Message::Binary(data)).await
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        // The peer may already be gone; a failed close frame is not an error
        if let Err(e) = self.inner.send(Message::Close(None)).await {
            debug!("Client close frame not delivered: {}", e);
        }
        let _ = self.inner.close().await;
        Ok(())
    }
}
