//! Environment variable loading.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ConfigError, ServerConfig, TlsConfig};

/// Read a variable, treating empty values as unset.
pub(super) fn var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a variable with `FromStr`.
pub(super) fn parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        None => Ok(None),
    }
}

/// Parse a boolean variable (`true/false`, `1/0`, `yes/no`, `on/off`).
pub(super) fn parse_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match var(key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        },
        None => Ok(None),
    }
}

/// Apply environment variables over `config`.
pub(super) fn apply_env(config: &mut ServerConfig) -> Result<(), ConfigError> {
    // Server
    if let Some(host) = var("HOST") {
        config.host = host;
    }
    if let Some(port) = parse::<u16>("PORT")? {
        config.port = port;
    }
    if let Some(public_host) = var("PUBLIC_HOST") {
        config.public_host = Some(public_host);
    }
    let cert = var("TLS_CERT_PATH");
    let key = var("TLS_KEY_PATH");
    match (cert, key) {
        (Some(cert), Some(key)) => {
            config.tls = Some(TlsConfig {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            });
        }
        (None, None) => {}
        _ => {
            return Err(ConfigError::Invalid(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together".to_string(),
            ));
        }
    }

    // Telephony
    if let Some(key) = var("TELNYX_API_KEY") {
        config.telnyx_api_key = Some(key);
    }
    if let Some(url) = var("TELNYX_API_URL") {
        config.telnyx_api_url = url;
    }

    // Upstream
    if let Some(provider) = var("UPSTREAM_PROVIDER") {
        config.upstream_provider = provider;
    }
    if let Some(model) = var("UPSTREAM_MODEL") {
        config.upstream_model = Some(model);
    }
    if let Some(voice) = var("UPSTREAM_VOICE") {
        config.upstream_voice = Some(voice);
    }
    if let Some(instructions) = var("UPSTREAM_INSTRUCTIONS") {
        config.upstream_instructions = Some(instructions);
    }
    if let Some(endpoint) = var("UPSTREAM_ENDPOINT") {
        config.upstream_endpoint = Some(endpoint);
    }
    if let Some(format) = var("UPSTREAM_AUDIO_FORMAT") {
        config.upstream_audio_format = Some(format);
    }
    if let Some(modality) = var("UPSTREAM_RESPONSE_MODALITY") {
        config.upstream_response_modality = Some(modality);
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.openai_api_key = Some(key);
    }
    if let Some(key) = var("GEMINI_API_KEY") {
        config.gemini_api_key = Some(key);
    }

    // Relay
    if let Some(capacity) = parse::<usize>("PENDING_AUDIO_CAPACITY")? {
        config.pending_audio_capacity = capacity;
    }
    if let Some(interval) = parse::<u64>("KEEPALIVE_INTERVAL_MS")? {
        config.keepalive_interval_ms = Some(interval).filter(|ms| *ms > 0);
    }
    if let Some(timeout) = parse::<u64>("DRAIN_TIMEOUT_MS")? {
        config.drain_timeout_ms = timeout;
    }
    if let Some(adopt) = parse_bool("ADOPT_UNREGISTERED_STREAMS")? {
        config.adopt_unregistered_streams = adopt;
    }
    if let Some(backend) = var("TRANSCODER_BACKEND") {
        config.transcoder_backend = backend;
    }
    if let Some(path) = var("FFMPEG_PATH") {
        config.ffmpeg_path = path;
    }
    if let Some(synthesize) = parse_bool("SYNTHESIZE_TRANSCRIPTS")? {
        config.synthesize_transcripts = synthesize;
    }
    if let Some(model) = var("TTS_MODEL") {
        config.tts_model = Some(model);
    }
    if let Some(voice) = var("TTS_VOICE") {
        config.tts_voice = Some(voice);
    }

    // Security
    if let Some(origins) = var("CORS_ALLOWED_ORIGINS") {
        config.cors_allowed_origins = Some(origins);
    }
    if let Some(rps) = parse::<u32>("RATE_LIMIT_REQUESTS_PER_SECOND")? {
        config.rate_limit_requests_per_second = rps;
    }
    if let Some(burst) = parse::<u32>("RATE_LIMIT_BURST_SIZE")? {
        config.rate_limit_burst_size = burst;
    }
    if let Some(max) = parse::<usize>("MAX_WEBSOCKET_CONNECTIONS")? {
        config.max_websocket_connections = Some(max);
    }
    if let Some(max) = parse::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = max;
    }

    Ok(())
}
