//! Realtime relay WebSocket handlers
//!
//! # Protocol
//!
//! ## Client → Server
//!
//! - **Binary frames**: raw PCM 16-bit mono audio at the configured input rate.
//!   An empty binary frame ends the session.
//! - **Text frames**: a typed user turn.
//!
//! ## Server → Client
//!
//! - **Binary frames**: model audio (PCM 16-bit mono, 24kHz)
//! - **Text frames**: model text or transcripts
//!
//! Tool calls never reach the client; they are answered by the relay.

mod handler;
pub mod session;
pub mod transport;

pub use handler::{realtime_handler, supervise};
pub use session::{DuplexSession, EndReason, SessionOptions, SessionReport, SessionState};
pub use transport::{ClientFrame, ClientSink, ClientSource};
