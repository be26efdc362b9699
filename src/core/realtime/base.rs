//! Base traits and types for realtime upstream bindings.
//!
//! This module defines the neutral event model the relay works with and the
//! [`SessionTranslator`] contract each upstream wire binding implements.
//!
//! # Audio Format
//!
//! Client audio is raw PCM 16-bit signed little-endian mono. Input is sent upstream
//! at the configured input rate (16kHz by default); model audio is returned to the
//! client unchanged (24kHz for both supported bindings).

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::tools::{ToolCall, ToolDeclaration, ToolResult};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the upstream failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The upstream refused the session setup
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Upstream WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Client transport error
    #[error("Client transport error: {0}")]
    ClientTransport(String),

    /// An upstream frame could not be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The handle was already closed
    #[error("Not connected")]
    NotConnected,
}

impl RealtimeError {
    /// Whether this error means the underlying connection is unusable.
    ///
    /// Data-level errors (malformed frames, serialization of a single message)
    /// are absorbed by the session; everything else ends it.
    pub fn is_transport_fault(&self) -> bool {
        !matches!(
            self,
            RealtimeError::MalformedFrame(_) | RealtimeError::SerializationError(_)
        )
    }
}

impl From<serde_json::Error> for RealtimeError {
    fn from(e: serde_json::Error) -> Self {
        RealtimeError::SerializationError(e.to_string())
    }
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// A serialized message in the upstream wire format.
pub type WireMessage = String;

// =============================================================================
// Neutral Event Model
// =============================================================================

/// An event decoded from one upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Model text (or a transcript of model audio)
    Text(String),
    /// Raw PCM audio from the model
    Audio(Bytes),
    /// Calls that must be answered together
    ToolCalls(Vec<ToolCall>),
}

/// Response channel the model may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Modality {
    Audio,
    Text,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Audio => "AUDIO",
            Modality::Text => "TEXT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "AUDIO" => Some(Modality::Audio),
            "TEXT" => Some(Modality::Text),
            _ => None,
        }
    }

    /// Parse a comma-separated list such as `"AUDIO,TEXT"`.
    pub fn parse_list(s: &str) -> Result<Vec<Self>, String> {
        s.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(|part| {
                Self::parse(part).ok_or_else(|| format!("unknown response modality '{}'", part.trim()))
            })
            .collect()
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration negotiated at session setup.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Upstream model identifier
    pub model: String,
    /// Persona / system instruction text
    pub persona: String,
    /// Speech locale, e.g. `id-ID`
    pub locale: Option<String>,
    /// Prebuilt voice name, if any
    pub voice: Option<String>,
    pub response_modalities: Vec<Modality>,
    /// Sample rate of client audio in Hz
    pub input_sample_rate: u32,
    pub tools: Vec<ToolDeclaration>,
}

/// How a frame received during setup should be treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReply {
    /// The upstream acknowledged the setup
    Accepted,
    /// The upstream refused the setup
    Rejected(String),
    /// Not a reply to the setup; keep waiting
    Pending,
}

// =============================================================================
// Translator Trait
// =============================================================================

/// Conversion between the neutral model and one upstream wire binding.
///
/// Implementations are stateless; one instance may serve any number of sessions.
pub trait SessionTranslator: Send + Sync {
    /// Name of the binding, for logging.
    fn binding(&self) -> &'static str;

    /// The single setup message announcing persona, modalities, locale and tools.
    fn build_handshake(&self, settings: &SessionSettings) -> RealtimeResult<WireMessage>;

    /// Classify a frame received while waiting for the setup acknowledgment.
    fn decode_handshake_reply(&self, frame: &str) -> RealtimeResult<HandshakeReply>;

    /// Wrap a raw PCM chunk for transmission upstream.
    fn encode_client_audio(&self, audio: &[u8]) -> RealtimeResult<WireMessage>;

    /// Encode a user text turn. May produce several messages.
    fn encode_client_text(&self, text: &str) -> RealtimeResult<Vec<WireMessage>>;

    /// Decode one upstream frame into zero or more events, in frame order.
    ///
    /// Absent or unknown fields mean the corresponding event did not occur. Only
    /// frames that cannot be parsed at all return [`RealtimeError::MalformedFrame`].
    fn decode_upstream(&self, frame: &str) -> RealtimeResult<Vec<InboundEvent>>;

    /// Encode a single tool result, preserving its id.
    fn encode_tool_result(&self, result: &ToolResult) -> RealtimeResult<WireMessage>;

    /// Encode the joint reply to one batch of calls.
    fn encode_tool_batch(&self, results: &[ToolResult]) -> RealtimeResult<Vec<WireMessage>> {
        results
            .iter()
            .map(|result| self.encode_tool_result(result))
            .collect()
    }
}

/// Boxed translator shared across sessions.
pub type SharedTranslator = std::sync::Arc<dyn SessionTranslator>;
