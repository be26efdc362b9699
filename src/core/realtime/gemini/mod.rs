//! Gemini Live API binding.
//!
//! Speaks the `BidiGenerateContent` WebSocket protocol: a `setup` message first,
//! then `realtimeInput` audio chunks and `toolResponse` batches; the server
//! streams `serverContent` and `toolCall` frames back.

mod config;
mod messages;
mod translator;

pub use config::{
    DEFAULT_GEMINI_MODEL, GEMINI_INPUT_SAMPLE_RATE, GEMINI_LIVE_URL, GEMINI_OUTPUT_SAMPLE_RATE,
    gemini_connect_url, qualified_model_name,
};
pub use messages::{ClientMessage, ServerMessage};
pub use translator::GeminiTranslator;
