//! Gemini Live API connection constants.

use url::Url;

use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// Gemini Live bidirectional streaming endpoint.
pub const GEMINI_LIVE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Default Live model.
pub const DEFAULT_GEMINI_MODEL: &str = "models/gemini-2.0-flash-live-001";

/// Sample rate Gemini expects for input audio.
pub const GEMINI_INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of audio produced by Gemini.
pub const GEMINI_OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Build the connection URL, carrying the API key as the `key` query parameter.
pub fn gemini_connect_url(base: &str, api_key: &str) -> RealtimeResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid Gemini URL: {e}")))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url.into())
}

/// Model names must carry the `models/` prefix on the wire.
pub fn qualified_model_name(model: &str) -> String {
    if model.starts_with("models/") || model.starts_with("tunedModels/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_appends_key() {
        let url = gemini_connect_url(GEMINI_LIVE_URL, "abc123").unwrap();
        assert!(url.starts_with("wss://generativelanguage.googleapis.com/ws/"));
        assert!(url.ends_with("BidiGenerateContent?key=abc123"));
    }

    #[test]
    fn test_connect_url_keeps_existing_query() {
        let url = gemini_connect_url("ws://127.0.0.1:9000/live?alt=1", "k").unwrap();
        assert_eq!(url, "ws://127.0.0.1:9000/live?alt=1&key=k");
    }

    #[test]
    fn test_connect_url_rejects_garbage() {
        assert!(matches!(
            gemini_connect_url("not a url", "k"),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_qualified_model_name() {
        assert_eq!(
            qualified_model_name("gemini-2.0-flash-live-001"),
            "models/gemini-2.0-flash-live-001"
        );
        assert_eq!(qualified_model_name(DEFAULT_GEMINI_MODEL), DEFAULT_GEMINI_MODEL);
    }
}
