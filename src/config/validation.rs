//! Configuration validation.

use super::{ConfigError, ServerConfig};
use crate::core::{TranscoderBackend, UpstreamProvider};

/// Check a fully merged configuration.
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.port == 0 {
        return Err(ConfigError::Invalid("port must be non-zero".to_string()));
    }
    if config.pending_audio_capacity == 0 {
        return Err(ConfigError::Invalid(
            "pending_audio_capacity must be at least 1".to_string(),
        ));
    }
    if config.drain_timeout_ms == 0 {
        return Err(ConfigError::Invalid(
            "drain_timeout_ms must be non-zero".to_string(),
        ));
    }
    if TranscoderBackend::parse(&config.transcoder_backend).is_none() {
        return Err(ConfigError::InvalidValue {
            key: "TRANSCODER_BACKEND".to_string(),
            value: config.transcoder_backend.clone(),
        });
    }
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err(ConfigError::Invalid(
            "rate limit settings must be non-zero".to_string(),
        ));
    }

    let provider = UpstreamProvider::parse(&config.upstream_provider).ok_or_else(|| {
        ConfigError::InvalidValue {
            key: "UPSTREAM_PROVIDER".to_string(),
            value: config.upstream_provider.clone(),
        }
    })?;
    config.upstream_api_key(provider)?;

    if config.synthesize_transcripts && config.openai_api_key.is_none() {
        return Err(ConfigError::MissingKey {
            key: "OPENAI_API_KEY".to_string(),
            purpose: "transcript synthesis".to_string(),
        });
    }

    Ok(())
}
