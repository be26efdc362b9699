//! Realtime upstream bindings.
//!
//! This module holds the neutral event model shared by the relay, the wire
//! translators for each supported upstream, and the WebSocket transport used
//! to reach them.
//!
//! # Supported Providers
//!
//! - **Gemini Live** - `BidiGenerateContent` over WebSocket (default)
//! - **OpenAI Realtime API** - `session.update` / `response.done` event protocol
//!
//! # Example
//!
//! ```rust
//! use relay_gateway::core::realtime::{InboundEvent, UpstreamProvider, create_translator};
//!
//! let translator = create_translator(UpstreamProvider::Gemini, 16000);
//! let events = translator
//!     .decode_upstream(r#"{"serverContent": {"modelTurn": {"parts": [{"text": "Halo"}]}}}"#)
//!     .unwrap();
//! assert_eq!(events, vec![InboundEvent::Text("Halo".to_string())]);
//! ```

mod base;
pub mod gemini;
pub mod openai;
mod transport;

use std::sync::Arc;
use std::time::Duration;

pub use base::{
    HandshakeReply, InboundEvent, Modality, RealtimeError, RealtimeResult, SessionSettings,
    SessionTranslator, SharedTranslator, WireMessage,
};
pub use gemini::GeminiTranslator;
pub use openai::OpenAITranslator;
pub use transport::{
    UpstreamConnector, UpstreamLink, UpstreamSink, UpstreamSource, WebSocketConnector, WsSink,
    WsSource,
};

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamProvider {
    /// Google Gemini Live API
    #[default]
    Gemini,
    /// OpenAI Realtime API
    OpenAI,
}

impl UpstreamProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" | "gemini-live" | "gemini_live" => Some(UpstreamProvider::Gemini),
            "openai" | "openai-realtime" | "openai_realtime" => Some(UpstreamProvider::OpenAI),
            _ => None,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            UpstreamProvider::Gemini => gemini::DEFAULT_GEMINI_MODEL,
            UpstreamProvider::OpenAI => openai::DEFAULT_OPENAI_MODEL,
        }
    }

    pub fn default_url(&self) -> &'static str {
        match self {
            UpstreamProvider::Gemini => gemini::GEMINI_LIVE_URL,
            UpstreamProvider::OpenAI => openai::OPENAI_REALTIME_URL,
        }
    }

    /// Environment variable holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            UpstreamProvider::Gemini => "GEMINI_API_KEY",
            UpstreamProvider::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl std::fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamProvider::Gemini => write!(f, "gemini"),
            UpstreamProvider::OpenAI => write!(f, "openai"),
        }
    }
}

/// Create the translator for a provider.
pub fn create_translator(provider: UpstreamProvider, input_sample_rate: u32) -> SharedTranslator {
    match provider {
        UpstreamProvider::Gemini => Arc::new(GeminiTranslator::new(input_sample_rate)),
        UpstreamProvider::OpenAI => Arc::new(OpenAITranslator::new(input_sample_rate)),
    }
}

/// Create the WebSocket connector for a provider.
///
/// Gemini takes the API key as a query parameter; OpenAI takes the model as a
/// query parameter and the key as a bearer token.
pub fn create_connector(
    provider: UpstreamProvider,
    base_url: &str,
    model: &str,
    api_key: &str,
    connect_timeout: Duration,
) -> RealtimeResult<WebSocketConnector> {
    match provider {
        UpstreamProvider::Gemini => Ok(WebSocketConnector::new(
            gemini::gemini_connect_url(base_url, api_key)?,
            connect_timeout,
        )),
        UpstreamProvider::OpenAI => Ok(WebSocketConnector::new(
            openai::openai_connect_url(base_url, model)?,
            connect_timeout,
        )
        .with_headers(openai::openai_headers(api_key))),
    }
}

/// Get list of supported upstream providers.
pub fn get_supported_upstream_providers() -> Vec<&'static str> {
    vec!["gemini", "openai"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parse() {
        assert_eq!(UpstreamProvider::parse("gemini"), Some(UpstreamProvider::Gemini));
        assert_eq!(UpstreamProvider::parse("GEMINI"), Some(UpstreamProvider::Gemini));
        assert_eq!(UpstreamProvider::parse("google"), Some(UpstreamProvider::Gemini));
        assert_eq!(UpstreamProvider::parse("OpenAI"), Some(UpstreamProvider::OpenAI));
        assert_eq!(UpstreamProvider::parse("hume"), None);
    }

    #[test]
    fn test_provider_display_round_trips() {
        for name in get_supported_upstream_providers() {
            let provider = UpstreamProvider::parse(name).unwrap();
            assert_eq!(provider.to_string(), name);
        }
    }

    #[test]
    fn test_create_translator_binding() {
        assert_eq!(create_translator(UpstreamProvider::Gemini, 16000).binding(), "gemini");
        assert_eq!(create_translator(UpstreamProvider::OpenAI, 24000).binding(), "openai");
    }

    #[test]
    fn test_create_connector_for_each_provider() {
        let timeout = Duration::from_secs(5);
        for provider in [UpstreamProvider::Gemini, UpstreamProvider::OpenAI] {
            let connector = create_connector(
                provider,
                provider.default_url(),
                provider.default_model(),
                "key",
                timeout,
            );
            assert!(connector.is_ok(), "{provider} connector should build");
        }

        assert!(matches!(
            create_connector(UpstreamProvider::Gemini, "::", "m", "k", timeout),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }
}
