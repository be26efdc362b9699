//! OpenAI Realtime API connection constants.

use url::Url;

use crate::core::realtime::base::{RealtimeError, RealtimeResult};

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-realtime-preview";

/// Sample rate of the `pcm16` audio format, both directions.
pub const OPENAI_REALTIME_SAMPLE_RATE: u32 = 24000;

/// Build the connection URL with the `model` query parameter.
pub fn openai_connect_url(base: &str, model: &str) -> RealtimeResult<String> {
    let mut url = Url::parse(base)
        .map_err(|e| RealtimeError::InvalidConfiguration(format!("invalid OpenAI URL: {e}")))?;
    url.query_pairs_mut().append_pair("model", model);
    Ok(url.into())
}

/// Headers required by the realtime endpoint.
pub fn openai_headers(api_key: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".to_string(), format!("Bearer {api_key}")),
        ("OpenAI-Beta".to_string(), "realtime=v1".to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_url_adds_model() {
        let url = openai_connect_url(OPENAI_REALTIME_URL, DEFAULT_OPENAI_MODEL).unwrap();
        assert_eq!(
            url,
            "wss://api.openai.com/v1/realtime?model=gpt-4o-realtime-preview"
        );
    }

    #[test]
    fn test_headers_carry_bearer_token() {
        let headers = openai_headers("sk-test");
        assert!(headers.contains(&("Authorization".to_string(), "Bearer sk-test".to_string())));
        assert!(headers.iter().any(|(name, _)| name == "OpenAI-Beta"));
    }
}
