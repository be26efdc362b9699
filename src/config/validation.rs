use super::{ServerConfig, TlsConfig};
use crate::core::realtime::Modality;

/// Run every validation rule against a merged configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    validate_port(config.port)?;
    config.upstream_api_key()?;
    validate_modalities(&config.response_modalities)?;
    validate_tls(&config.tls)?;
    validate_rate_limits(
        config.rate_limit_requests_per_second,
        config.rate_limit_burst_size,
    )?;
    validate_timeouts(config.handshake_timeout_seconds, config.idle_timeout_seconds)?;
    Ok(())
}

pub fn validate_port(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    if port == 0 {
        return Err("PORT must be non-zero".into());
    }
    Ok(())
}

/// At least one modality, no duplicates.
pub fn validate_modalities(modalities: &[Modality]) -> Result<(), Box<dyn std::error::Error>> {
    if modalities.is_empty() {
        return Err("RESPONSE_MODALITIES must name at least one of AUDIO, TEXT".into());
    }
    for (i, modality) in modalities.iter().enumerate() {
        if modalities[..i].contains(modality) {
            return Err(format!("RESPONSE_MODALITIES lists {modality} twice").into());
        }
    }
    Ok(())
}

/// Validate TLS configuration
///
/// Both the certificate and the key file must exist when TLS is enabled.
pub fn validate_tls(tls: &Option<TlsConfig>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(tls) = tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file does not exist: {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!(
                "TLS private key file does not exist: {}",
                tls.key_path.display()
            )
            .into());
        }
    }
    Ok(())
}

pub fn validate_rate_limits(
    requests_per_second: u32,
    burst_size: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    if requests_per_second == 0 {
        return Err("RATE_LIMIT_REQUESTS_PER_SECOND must be greater than zero".into());
    }
    if burst_size == 0 {
        return Err("RATE_LIMIT_BURST_SIZE must be greater than zero".into());
    }
    Ok(())
}

pub fn validate_timeouts(
    handshake_timeout_seconds: u64,
    idle_timeout_seconds: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    if handshake_timeout_seconds == 0 {
        return Err("HANDSHAKE_TIMEOUT_SECONDS must be greater than zero".into());
    }
    if idle_timeout_seconds == Some(0) {
        return Err("IDLE_TIMEOUT_SECONDS must be greater than zero when set".into());
    }
    Ok(())
}
