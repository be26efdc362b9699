use std::env;
use std::path::PathBuf;

use super::utils::{non_empty, parse_bool, parse_modalities};
use super::yaml::YamlConfig;
use super::{DEFAULT_LOCALE, DEFAULT_PERSONA, ServerConfig, TlsConfig};
use crate::core::realtime::{UpstreamProvider, gemini, openai};

/// Merge YAML configuration with environment variables
///
/// Priority order (highest to lowest):
/// 1. YAML configuration values
/// 2. Environment variables
/// 3. Default values
///
/// Some defaults depend on the selected upstream provider (model, endpoint, input
/// sample rate, which API key variable is read), so the provider is resolved first.
pub fn merge_config(
    yaml_config: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let yaml = yaml_config.unwrap_or_default();

    // Helper macro to get value with priority: YAML > ENV > Default
    macro_rules! get_value {
        ($env_var:expr, $yaml_value:expr, $default:expr) => {
            $yaml_value
                .or_else(|| env::var($env_var).ok())
                .unwrap_or_else(|| $default.to_string())
        };
    }

    // Helper macro for optional values: YAML > ENV
    macro_rules! get_optional {
        ($env_var:expr, $yaml_value:expr) => {
            non_empty($yaml_value.or_else(|| env::var($env_var).ok()))
        };
    }

    // Helper macro for parsed values: YAML > ENV (parsed) > Default
    macro_rules! get_parsed {
        ($env_var:expr, $yaml_value:expr, $ty:ty, $default:expr) => {
            match $yaml_value {
                Some(value) => value,
                None => match env::var($env_var) {
                    Ok(raw) => raw
                        .trim()
                        .parse::<$ty>()
                        .map_err(|e| format!("Invalid {} environment variable: {e}", $env_var))?,
                    Err(_) => $default,
                },
            }
        };
    }

    let server = yaml.server.unwrap_or_default();
    let upstream = yaml.upstream.unwrap_or_default();
    let session = yaml.session.unwrap_or_default();
    let security = yaml.security.unwrap_or_default();

    // Server configuration
    let host = get_value!("HOST", server.host, "0.0.0.0");
    let port = get_parsed!("PORT", server.port, u16, 8080);

    // TLS configuration
    let tls_yaml = server.tls.unwrap_or_default();
    let cert_path = get_optional!("TLS_CERT_PATH", tls_yaml.cert_path);
    let key_path = get_optional!("TLS_KEY_PATH", tls_yaml.key_path);
    let tls_enabled = tls_yaml
        .enabled
        .or_else(|| env::var("TLS_ENABLED").ok().and_then(|s| parse_bool(&s)))
        .unwrap_or(cert_path.is_some() || key_path.is_some());
    let tls = if tls_enabled {
        match (cert_path, key_path) {
            (Some(cert), Some(key)) => Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            }),
            _ => {
                return Err(
                    "TLS is enabled but TLS_CERT_PATH and TLS_KEY_PATH are not both set".into(),
                );
            }
        }
    } else {
        None
    };

    // Upstream configuration
    let provider_name = get_value!("UPSTREAM_PROVIDER", upstream.provider, "gemini");
    let upstream_provider = UpstreamProvider::parse(&provider_name).ok_or_else(|| {
        format!("Unsupported upstream provider '{provider_name}'. Supported: gemini, openai")
    })?;

    let upstream_api_key = get_optional!(upstream_provider.api_key_env(), upstream.api_key);
    let upstream_model = get_value!(
        "UPSTREAM_MODEL",
        upstream.model,
        upstream_provider.default_model()
    );
    let upstream_url = get_value!("UPSTREAM_URL", upstream.url, upstream_provider.default_url());
    let handshake_timeout_seconds = get_parsed!(
        "HANDSHAKE_TIMEOUT_SECONDS",
        upstream.handshake_timeout_seconds,
        u64,
        10
    );

    // Session configuration
    let persona = get_value!("PERSONA_INSTRUCTIONS", session.persona, DEFAULT_PERSONA);
    let session_locale = get_optional!("SESSION_LOCALE", session.locale)
        .or_else(|| Some(DEFAULT_LOCALE.to_string()));
    let response_modalities = match session.response_modalities {
        Some(values) => parse_modalities(&values)?,
        None => {
            let raw = env::var("RESPONSE_MODALITIES").unwrap_or_else(|_| "AUDIO,TEXT".to_string());
            let values: Vec<&str> = raw.split(',').filter(|v| !v.trim().is_empty()).collect();
            parse_modalities(&values)?
        }
    };
    let session_voice = get_optional!("SESSION_VOICE", session.voice);
    let default_sample_rate = match upstream_provider {
        UpstreamProvider::Gemini => gemini::GEMINI_INPUT_SAMPLE_RATE,
        UpstreamProvider::OpenAI => openai::OPENAI_REALTIME_SAMPLE_RATE,
    };
    let input_sample_rate = get_parsed!(
        "INPUT_SAMPLE_RATE",
        session.input_sample_rate,
        u32,
        default_sample_rate
    );
    let idle_timeout_seconds = match session.idle_timeout_seconds {
        Some(value) => Some(value),
        None => env::var("IDLE_TIMEOUT_SECONDS")
            .ok()
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| format!("Invalid IDLE_TIMEOUT_SECONDS environment variable: {e}"))
            })
            .transpose()?,
    };

    // Security configuration
    let cors_allowed_origins = get_optional!("CORS_ALLOWED_ORIGINS", security.cors_allowed_origins);
    let rate_limit_requests_per_second = get_parsed!(
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        security.rate_limit_requests_per_second,
        u32,
        60
    );
    let rate_limit_burst_size = get_parsed!(
        "RATE_LIMIT_BURST_SIZE",
        security.rate_limit_burst_size,
        u32,
        10
    );
    let max_websocket_connections = match security.max_websocket_connections {
        Some(value) => Some(value),
        None => env::var("MAX_WEBSOCKET_CONNECTIONS")
            .ok()
            .map(|raw| {
                raw.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("Invalid MAX_WEBSOCKET_CONNECTIONS environment variable: {e}"))
            })
            .transpose()?,
    };
    let max_connections_per_ip = get_parsed!(
        "MAX_CONNECTIONS_PER_IP",
        security.max_connections_per_ip,
        u32,
        100
    );

    Ok(ServerConfig {
        host,
        port,
        tls,
        upstream_provider,
        upstream_api_key,
        upstream_model,
        upstream_url,
        handshake_timeout_seconds,
        persona,
        session_locale,
        response_modalities,
        session_voice,
        input_sample_rate,
        idle_timeout_seconds,
        cors_allowed_origins,
        rate_limit_requests_per_second,
        rate_limit_burst_size,
        max_websocket_connections,
        max_connections_per_ip,
    })
}
