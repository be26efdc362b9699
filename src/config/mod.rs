//! Configuration module for the relay gateway
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//! - `utils`: Utility functions for configuration parsing
//!
//! # Example
//! ```rust,no_run
//! use relay_gateway::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod utils;
mod validation;
mod yaml;

use crate::core::realtime::{Modality, SessionSettings, UpstreamProvider};
use crate::core::tools::ToolDeclaration;

/// Persona used when none is configured.
pub const DEFAULT_PERSONA: &str =
    "Kamu adalah asisten drive thru. Jawab hanya dalam Bahasa Indonesia.";

/// Default speech locale.
pub const DEFAULT_LOCALE: &str = "id-ID";

/// Stands in for secrets in `Debug` output.
const REDACTED: &str = "[REDACTED]";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay, including:
/// - Server settings (host, port, TLS)
/// - Upstream settings (provider, credential, model, endpoint)
/// - Session settings (persona, locale, modalities, voice, timeouts)
/// - Security settings (CORS, rate limiting, connection limits)
///
/// Loaded once at startup and shared read-only through `AppState`.
#[derive(Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream settings
    pub upstream_provider: UpstreamProvider,
    /// API key for the selected provider
    pub upstream_api_key: Option<String>,
    pub upstream_model: String,
    /// WebSocket endpoint of the provider
    pub upstream_url: String,
    /// Seconds to wait for the setup acknowledgment
    /// Default: 10
    pub handshake_timeout_seconds: u64,

    // Session settings
    /// System instruction sent with every session
    pub persona: String,
    /// Speech locale, e.g. "id-ID"
    pub session_locale: Option<String>,
    pub response_modalities: Vec<Modality>,
    pub session_voice: Option<String>,
    /// Sample rate of client audio in Hz
    /// Default: 16000 (gemini), 24000 (openai)
    pub input_sample_rate: u32,
    /// Close sessions whose client sends nothing for this many seconds
    /// Default: None (no idle timeout)
    pub idle_timeout_seconds: Option<u64>,

    // Security settings
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled)
    pub cors_allowed_origins: Option<String>,

    // Rate limiting
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("upstream_provider", &self.upstream_provider)
            .field(
                "upstream_api_key",
                &self.upstream_api_key.as_ref().map(|_| REDACTED),
            )
            .field("upstream_model", &self.upstream_model)
            .field("upstream_url", &self.upstream_url)
            .field("handshake_timeout_seconds", &self.handshake_timeout_seconds)
            .field("persona", &self.persona)
            .field("session_locale", &self.session_locale)
            .field("response_modalities", &self.response_modalities)
            .field("session_voice", &self.session_voice)
            .field("input_sample_rate", &self.input_sample_rate)
            .field("idle_timeout_seconds", &self.idle_timeout_seconds)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field(
                "rate_limit_requests_per_second",
                &self.rate_limit_requests_per_second,
            )
            .field("rate_limit_burst_size", &self.rate_limit_burst_size)
            .field("max_websocket_connections", &self.max_websocket_connections)
            .field("max_connections_per_ip", &self.max_connections_per_ip)
            .finish()
    }
}

/// Zeroize the upstream credential when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.upstream_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// After loading and merging, performs validation on the final configuration.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // Note: .env file is loaded in main.rs at application startup
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate_config(&config)?;

        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }

    /// The upstream API key, or an error naming the variable to set.
    pub fn upstream_api_key(&self) -> Result<&str, String> {
        match self.upstream_api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(format!(
                "{} is required for the {} upstream",
                self.upstream_provider.api_key_env(),
                self.upstream_provider
            )),
        }
    }

    /// Static session configuration announced in every handshake.
    pub fn session_settings(&self, tools: Vec<ToolDeclaration>) -> SessionSettings {
        SessionSettings {
            model: self.upstream_model.clone(),
            persona: self.persona.clone(),
            locale: self.session_locale.clone(),
            voice: self.session_voice.clone(),
            response_modalities: self.response_modalities.clone(),
            input_sample_rate: self.input_sample_rate,
            tools,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::env;

    /// A valid configuration for tests, independent of the environment.
    pub fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            tls: None,
            upstream_provider: UpstreamProvider::Gemini,
            upstream_api_key: Some("test-key".to_string()),
            upstream_model: UpstreamProvider::Gemini.default_model().to_string(),
            upstream_url: UpstreamProvider::Gemini.default_url().to_string(),
            handshake_timeout_seconds: 10,
            persona: DEFAULT_PERSONA.to_string(),
            session_locale: Some(DEFAULT_LOCALE.to_string()),
            response_modalities: vec![Modality::Audio, Modality::Text],
            session_voice: None,
            input_sample_rate: 16000,
            idle_timeout_seconds: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }

    /// Remove every variable the loader reads.
    pub(crate) fn cleanup_env_vars() {
        unsafe {
            for key in [
                "HOST",
                "PORT",
                "TLS_CERT_PATH",
                "TLS_KEY_PATH",
                "TLS_ENABLED",
                "UPSTREAM_PROVIDER",
                "GEMINI_API_KEY",
                "OPENAI_API_KEY",
                "UPSTREAM_MODEL",
                "UPSTREAM_URL",
                "HANDSHAKE_TIMEOUT_SECONDS",
                "PERSONA_INSTRUCTIONS",
                "SESSION_LOCALE",
                "RESPONSE_MODALITIES",
                "SESSION_VOICE",
                "INPUT_SAMPLE_RATE",
                "IDLE_TIMEOUT_SECONDS",
                "CORS_ALLOWED_ORIGINS",
                "RATE_LIMIT_REQUESTS_PER_SECOND",
                "RATE_LIMIT_BURST_SIZE",
                "MAX_WEBSOCKET_CONNECTIONS",
                "MAX_CONNECTIONS_PER_IP",
            ] {
                env::remove_var(key);
            }
        }
    }
}
