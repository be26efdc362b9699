//! Shared test doubles for relay tests.
//!
//! - In-memory client and upstream halves driven through channels, with a shared
//!   event log so tests can assert on the order of writes across both sides.
//! - A Gemini-style mock upstream WebSocket server on `127.0.0.1:0`.

// Each integration test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use relay_gateway::core::realtime::{
    Modality, RealtimeError, RealtimeResult, SessionSettings, UpstreamLink, UpstreamSink,
    UpstreamSource, WireMessage,
};
use relay_gateway::core::tools::ToolRegistry;
use relay_gateway::core::tools::builtin::{OrderBook, register_builtin_tools, save_order_declaration};
use relay_gateway::handlers::realtime::{ClientFrame, ClientSink, ClientSource};

/// How long tests wait for any single expected frame.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered record of writes on both sides: `client:text`, `client:audio`,
/// `upstream:<message key>`.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Something the relay wrote to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutput {
    Text(String),
    Audio(Bytes),
}

// =============================================================================
// In-memory client
// =============================================================================

pub struct FakeClientSource {
    rx: mpsc::UnboundedReceiver<RealtimeResult<ClientFrame>>,
}

#[async_trait]
impl ClientSource for FakeClientSource {
    async fn recv(&mut self) -> RealtimeResult<Option<ClientFrame>> {
        match self.rx.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

pub struct FakeClientSink {
    tx: mpsc::UnboundedSender<ClientOutput>,
    log: EventLog,
    closes: Arc<AtomicUsize>,
    closed: bool,
    /// While set, every write hangs like a client that stopped reading
    stalled: Arc<AtomicBool>,
}

impl FakeClientSink {
    async fn wait_if_stalled(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            self.log.lock().push("client:stalled".to_string());
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl ClientSink for FakeClientSink {
    async fn send_text(&mut self, text: String) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::NotConnected);
        }
        self.wait_if_stalled().await;
        self.log.lock().push("client:text".to_string());
        let _ = self.tx.send(ClientOutput::Text(text));
        Ok(())
    }

    async fn send_binary(&mut self, data: Bytes) -> RealtimeResult<()> {
        if self.closed {
            return Err(RealtimeError::NotConnected);
        }
        self.wait_if_stalled().await;
        self.log.lock().push("client:audio".to_string());
        let _ = self.tx.send(ClientOutput::Audio(data));
        Ok(())
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        Ok(())
    }
}

// =============================================================================
// In-memory upstream
// =============================================================================

pub struct FakeUpstreamSink {
    tx: mpsc::UnboundedSender<String>,
    log: EventLog,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl UpstreamSink for FakeUpstreamSink {
    async fn send(&mut self, message: WireMessage) -> RealtimeResult<()> {
        self.log
            .lock()
            .push(format!("upstream:{}", message_key(&message)));
        let _ = self.tx.send(message);
        Ok(())
    }

    async fn close(&mut self) -> RealtimeResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeUpstreamSource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl UpstreamSource for FakeUpstreamSource {
    async fn recv(&mut self) -> RealtimeResult<Option<String>> {
        Ok(self.rx.recv().await)
    }
}

/// First top-level key of a JSON message (`setup`, `toolResponse`, ...).
pub fn message_key(message: &str) -> String {
    serde_json::from_str::<Map<String, Value>>(message)
        .ok()
        .and_then(|map| map.keys().next().cloned())
        .unwrap_or_else(|| "<unparsed>".to_string())
}

/// The test's ends of an in-memory relay session.
pub struct Harness {
    /// Frames the client sends; drop to disconnect the client
    pub client_tx: Option<mpsc::UnboundedSender<RealtimeResult<ClientFrame>>>,
    /// What the relay delivered to the client
    pub client_rx: mpsc::UnboundedReceiver<ClientOutput>,
    /// Frames the upstream sends; drop to close the upstream
    pub upstream_tx: Option<mpsc::UnboundedSender<String>>,
    /// What the relay wrote upstream
    pub upstream_rx: mpsc::UnboundedReceiver<String>,
    pub log: EventLog,
    pub client_closes: Arc<AtomicUsize>,
    pub upstream_closes: Arc<AtomicUsize>,
    pub client_stalled: Arc<AtomicBool>,
}

/// The session's ends of an in-memory relay session.
pub struct SessionEnds {
    pub client_sink: Box<dyn ClientSink>,
    pub client_source: Box<dyn ClientSource>,
    pub upstream: UpstreamLink,
}

pub fn harness() -> (Harness, SessionEnds) {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let client_closes = Arc::new(AtomicUsize::new(0));
    let upstream_closes = Arc::new(AtomicUsize::new(0));
    let client_stalled = Arc::new(AtomicBool::new(false));

    let (client_in_tx, client_in_rx) = mpsc::unbounded_channel();
    let (client_out_tx, client_out_rx) = mpsc::unbounded_channel();
    let (upstream_in_tx, upstream_in_rx) = mpsc::unbounded_channel();
    let (upstream_out_tx, upstream_out_rx) = mpsc::unbounded_channel();

    let ends = SessionEnds {
        client_sink: Box::new(FakeClientSink {
            tx: client_out_tx,
            log: log.clone(),
            closes: client_closes.clone(),
            closed: false,
            stalled: client_stalled.clone(),
        }),
        client_source: Box::new(FakeClientSource { rx: client_in_rx }),
        upstream: UpstreamLink::new(
            FakeUpstreamSink {
                tx: upstream_out_tx,
                log: log.clone(),
                closes: upstream_closes.clone(),
            },
            FakeUpstreamSource { rx: upstream_in_rx },
        ),
    };

    let harness = Harness {
        client_tx: Some(client_in_tx),
        client_rx: client_out_rx,
        upstream_tx: Some(upstream_in_tx),
        upstream_rx: upstream_out_rx,
        log,
        client_closes,
        upstream_closes,
        client_stalled,
    };

    (harness, ends)
}

impl Harness {
    pub fn client_sends(&self, frame: ClientFrame) {
        if let Some(tx) = &self.client_tx {
            tx.send(Ok(frame)).unwrap();
        }
    }

    pub fn client_fails(&self, error: RealtimeError) {
        if let Some(tx) = &self.client_tx {
            tx.send(Err(error)).unwrap();
        }
    }

    pub fn upstream_sends(&self, frame: Value) {
        if let Some(tx) = &self.upstream_tx {
            tx.send(frame.to_string()).unwrap();
        }
    }

    pub fn upstream_sends_raw(&self, frame: &str) {
        if let Some(tx) = &self.upstream_tx {
            tx.send(frame.to_string()).unwrap();
        }
    }

    /// Make every later client write hang until the session drops it.
    pub fn stall_client_writes(&self) {
        self.client_stalled.store(true, Ordering::SeqCst);
    }

    /// Wait until `entry` appears in the event log.
    pub async fn wait_for_log(&self, entry: &str) {
        tokio::time::timeout(STEP_TIMEOUT, async {
            while !self.log.lock().iter().any(|e| e == entry) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("'{entry}' never logged"));
    }

    pub fn disconnect_client(&mut self) {
        self.client_tx = None;
    }

    pub fn close_upstream(&mut self) {
        self.upstream_tx = None;
    }

    /// Next message the relay wrote upstream, parsed.
    pub async fn next_upstream(&mut self) -> Value {
        let frame = tokio::time::timeout(STEP_TIMEOUT, self.upstream_rx.recv())
            .await
            .expect("timed out waiting for an upstream write")
            .expect("upstream write channel closed");
        serde_json::from_str(&frame).expect("relay wrote invalid JSON upstream")
    }

    /// Next output delivered to the client.
    pub async fn next_client(&mut self) -> ClientOutput {
        tokio::time::timeout(STEP_TIMEOUT, self.client_rx.recv())
            .await
            .expect("timed out waiting for client output")
            .expect("client output channel closed")
    }

    /// Consume the setup message and acknowledge it.
    pub async fn accept_handshake(&mut self) -> Value {
        let setup = self.next_upstream().await;
        assert!(setup.get("setup").is_some(), "first message must be setup: {setup}");
        self.upstream_sends(json!({ "setupComplete": {} }));
        setup
    }

    pub fn log_snapshot(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

// =============================================================================
// Session fixtures
// =============================================================================

pub fn registry_with_orders() -> (Arc<ToolRegistry>, OrderBook) {
    let orders = OrderBook::new();
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry, orders.clone()).unwrap();
    (Arc::new(registry), orders)
}

pub fn session_settings() -> SessionSettings {
    SessionSettings {
        model: "models/gemini-2.0-flash-live-001".to_string(),
        persona: "Kamu adalah asisten drive thru. Jawab hanya dalam Bahasa Indonesia."
            .to_string(),
        locale: Some("id-ID".to_string()),
        voice: None,
        response_modalities: vec![Modality::Audio, Modality::Text],
        input_sample_rate: 16000,
        tools: vec![save_order_declaration()],
    }
}

// =============================================================================
// Mock upstream WebSocket server
// =============================================================================

/// What a scripted mock upstream does once the setup arrives.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Acknowledge the setup, then forward frames both ways through channels
    Accept,
    /// Reply with an error frame instead of acknowledging
    Reject(String),
}

/// One accepted connection on the mock upstream.
pub struct MockConnection {
    /// Every text frame the relay sent, setup included
    pub received: mpsc::UnboundedReceiver<String>,
    /// Frames to push to the relay; drop to close the upstream side
    pub send: mpsc::UnboundedSender<String>,
}

impl MockConnection {
    pub async fn next_message(&mut self) -> Option<Value> {
        let frame = tokio::time::timeout(STEP_TIMEOUT, self.received.recv())
            .await
            .expect("timed out waiting for a relay frame")?;
        Some(serde_json::from_str(&frame).expect("relay sent invalid JSON"))
    }
}

/// Start a mock upstream accepting any number of connections.
///
/// Returns the bound address and a channel yielding one [`MockConnection`] per
/// accepted socket.
pub async fn start_mock_upstream(
    behavior: MockBehavior,
) -> (SocketAddr, mpsc::UnboundedReceiver<MockConnection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let behavior = behavior.clone();
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let Ok(ws) = accept_async(stream).await else {
                    return;
                };
                let (mut write, mut read) = ws.split();
                let (received_tx, received_rx) = mpsc::unbounded_channel::<String>();
                let (send_tx, mut send_rx) = mpsc::unbounded_channel::<String>();
                let _ = conn_tx.send(MockConnection {
                    received: received_rx,
                    send: send_tx,
                });

                // The first frame is the setup
                let Some(Ok(Message::Text(setup))) = read.next().await else {
                    return;
                };
                let _ = received_tx.send(setup.to_string());

                let reply = match &behavior {
                    MockBehavior::Accept => json!({ "setupComplete": {} }),
                    MockBehavior::Reject(message) => {
                        json!({ "error": { "code": 400, "message": message } })
                    }
                };
                if write
                    .send(Message::Text(reply.to_string().into()))
                    .await
                    .is_err()
                {
                    return;
                }
                if matches!(behavior, MockBehavior::Reject(_)) {
                    let _ = write.close().await;
                    return;
                }

                loop {
                    tokio::select! {
                        incoming = read.next() => match incoming {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text.to_string());
                            }
                            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                            Some(Ok(_)) => {}
                        },
                        outgoing = send_rx.recv() => match outgoing {
                            Some(frame) => {
                                if write.send(Message::Text(frame.into())).await.is_err() {
                                    break;
                                }
                            }
                            None => {
                                let _ = write.close().await;
                                break;
                            }
                        },
                    }
                }
            });
        }
    });

    (addr, conn_rx)
}
