//! Applying YAML overrides on top of environment configuration.

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ConfigError, ServerConfig, TlsConfig};

/// Apply every value present in `yaml` over `config`.
pub(super) fn apply_yaml(config: &mut ServerConfig, yaml: YamlConfig) -> Result<(), ConfigError> {
    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(public_host) = server.public_host {
            config.public_host = Some(public_host);
        }
        if let Some(tls) = server.tls {
            if tls.enabled == Some(false) {
                config.tls = None;
            } else {
                match (tls.cert_path, tls.key_path) {
                    (Some(cert), Some(key)) => {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    }
                    (None, None) => {}
                    _ => {
                        return Err(ConfigError::Invalid(
                            "server.tls requires both cert_path and key_path".to_string(),
                        ));
                    }
                }
            }
        }
    }

    if let Some(telephony) = yaml.telephony {
        if let Some(key) = telephony.telnyx_api_key {
            config.telnyx_api_key = Some(key);
        }
        if let Some(url) = telephony.telnyx_api_url {
            config.telnyx_api_url = url;
        }
    }

    if let Some(upstream) = yaml.upstream {
        if let Some(provider) = upstream.provider {
            config.upstream_provider = provider;
        }
        if upstream.model.is_some() {
            config.upstream_model = upstream.model;
        }
        if upstream.voice.is_some() {
            config.upstream_voice = upstream.voice;
        }
        if upstream.instructions.is_some() {
            config.upstream_instructions = upstream.instructions;
        }
        if upstream.endpoint.is_some() {
            config.upstream_endpoint = upstream.endpoint;
        }
        if upstream.audio_format.is_some() {
            config.upstream_audio_format = upstream.audio_format;
        }
        if upstream.response_modality.is_some() {
            config.upstream_response_modality = upstream.response_modality;
        }
    }

    if let Some(providers) = yaml.providers {
        if providers.openai_api_key.is_some() {
            config.openai_api_key = providers.openai_api_key;
        }
        if providers.gemini_api_key.is_some() {
            config.gemini_api_key = providers.gemini_api_key;
        }
    }

    if let Some(relay) = yaml.relay {
        if let Some(capacity) = relay.pending_audio_capacity {
            config.pending_audio_capacity = capacity;
        }
        if let Some(interval) = relay.keepalive_interval_ms {
            config.keepalive_interval_ms = Some(interval).filter(|ms| *ms > 0);
        }
        if let Some(timeout) = relay.drain_timeout_ms {
            config.drain_timeout_ms = timeout;
        }
        if let Some(adopt) = relay.adopt_unregistered_streams {
            config.adopt_unregistered_streams = adopt;
        }
        if let Some(backend) = relay.transcoder_backend {
            config.transcoder_backend = backend;
        }
        if let Some(path) = relay.ffmpeg_path {
            config.ffmpeg_path = path;
        }
        if let Some(synthesize) = relay.synthesize_transcripts {
            config.synthesize_transcripts = synthesize;
        }
    }

    if let Some(tts) = yaml.tts {
        if tts.model.is_some() {
            config.tts_model = tts.model;
        }
        if tts.voice.is_some() {
            config.tts_voice = tts.voice;
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if let Some(rps) = security.rate_limit_requests_per_second {
            config.rate_limit_requests_per_second = rps;
        }
        if let Some(burst) = security.rate_limit_burst_size {
            config.rate_limit_burst_size = burst;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(max) = security.max_connections_per_ip {
            config.max_connections_per_ip = max;
        }
    }

    Ok(())
}
