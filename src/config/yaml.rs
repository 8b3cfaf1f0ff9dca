use serde::Deserialize;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///   public_host: "relay.example.com"
///   tls:
///     enabled: true
///     cert_path: "/etc/call-relay/cert.pem"
///     key_path: "/etc/call-relay/key.pem"
///
/// telephony:
///   telnyx_api_key: "KEY..."
///   telnyx_api_url: "https://api.telnyx.com/v2"
///
/// upstream:
///   provider: "openai"
///   model: "gpt-4o-realtime-preview"
///   voice: "alloy"
///   instructions: "You are a friendly phone assistant."
///   audio_format: "g711_ulaw"
///   response_modality: "audio"
///
/// providers:
///   openai_api_key: "sk-..."
///   gemini_api_key: "AIza..."
///
/// relay:
///   pending_audio_capacity: 250
///   keepalive_interval_ms: 1000
///   drain_timeout_ms: 5000
///   adopt_unregistered_streams: true
///   transcoder_backend: "native"
///   ffmpeg_path: "/usr/bin/ffmpeg"
///   synthesize_transcripts: false
///
/// tts:
///   model: "tts-1"
///   voice: "echo"
///
/// security:
///   cors_allowed_origins: "*"
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   max_websocket_connections: 1000
///   max_connections_per_ip: 100
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub telephony: Option<TelephonyYaml>,
    pub upstream: Option<UpstreamYaml>,
    pub providers: Option<ProvidersYaml>,
    pub relay: Option<RelayYaml>,
    pub tts: Option<TtsYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Host advertised to carriers in media stream URLs
    pub public_host: Option<String>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Carrier integration settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TelephonyYaml {
    pub telnyx_api_key: Option<String>,
    pub telnyx_api_url: Option<String>,
}

/// Upstream AI session settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UpstreamYaml {
    /// `openai` or `gemini`
    pub provider: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub endpoint: Option<String>,
    pub audio_format: Option<String>,
    /// `audio` or `text`
    pub response_modality: Option<String>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI API key for the Realtime API and speech synthesis
    pub openai_api_key: Option<String>,
    /// Google AI Studio key for Gemini Live
    pub gemini_api_key: Option<String>,
}

/// Session relay settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RelayYaml {
    pub pending_audio_capacity: Option<usize>,
    pub keepalive_interval_ms: Option<u64>,
    pub drain_timeout_ms: Option<u64>,
    pub adopt_unregistered_streams: Option<bool>,
    /// `native` or `ffmpeg`
    pub transcoder_backend: Option<String>,
    pub ffmpeg_path: Option<String>,
    pub synthesize_transcripts: Option<bool>,
}

/// Speech synthesis settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsYaml {
    pub model: Option<String>,
    pub voice: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// CORS allowed origins (comma-separated list or "*" for all)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Maximum concurrent WebSocket connections
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_host: "relay.example.com"
upstream:
  provider: "gemini"
  response_modality: "text"
providers:
  gemini_api_key: "g-key"
relay:
  pending_audio_capacity: 50
  keepalive_interval_ms: 500
  transcoder_backend: "ffmpeg"
tts:
  voice: "nova"
"#;
        let config = YamlConfig::parse(yaml).unwrap();
        let server = config.server.unwrap();
        assert_eq!(server.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(server.port, Some(8080));
        assert_eq!(server.public_host.as_deref(), Some("relay.example.com"));

        let upstream = config.upstream.unwrap();
        assert_eq!(upstream.provider.as_deref(), Some("gemini"));
        assert_eq!(upstream.response_modality.as_deref(), Some("text"));

        let relay = config.relay.unwrap();
        assert_eq!(relay.pending_audio_capacity, Some(50));
        assert_eq!(relay.keepalive_interval_ms, Some(500));
        assert_eq!(relay.transcoder_backend.as_deref(), Some("ffmpeg"));
        assert_eq!(config.tts.unwrap().voice.as_deref(), Some("nova"));
    }

    #[test]
    fn test_parse_empty_config() {
        let config = YamlConfig::parse("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = YamlConfig::parse("server: [unclosed").unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML"));
    }
}
