//! Configuration module for the call relay
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Applying YAML overrides
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use call_relay::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base values
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod env;
mod merge;
mod validation;
pub mod yaml;

use crate::core::session::{DEFAULT_DRAIN_TIMEOUT, DEFAULT_PENDING_AUDIO_CAPACITY};
use crate::core::transcoder::DEFAULT_FFMPEG_PATH;
use crate::core::{
    RelaySettings, SessionSettings, TTSConfig, TranscoderBackend, UpstreamConfig,
    UpstreamProvider,
};
use crate::telephony::TELNYX_API_BASE;

/// Errors raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to parse YAML: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },

    #[error("{key} is required for {purpose}")]
    MissingKey { key: String, purpose: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains all configuration needed to run the relay:
/// - Server settings (host, port, TLS, public host)
/// - Carrier credentials (Telnyx)
/// - Upstream AI session settings and provider keys
/// - Relay tuning (pending audio, keepalive, drain, transcoding, synthesis)
/// - Security settings (CORS, rate limiting, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// Host advertised in media stream URLs. Falls back to the request `Host`.
    pub public_host: Option<String>,

    // Telephony
    pub telnyx_api_key: Option<String>,
    pub telnyx_api_url: String,

    // Upstream
    pub upstream_provider: String,
    pub upstream_model: Option<String>,
    pub upstream_voice: Option<String>,
    pub upstream_instructions: Option<String>,
    pub upstream_endpoint: Option<String>,
    pub upstream_audio_format: Option<String>,
    /// `audio` (default) or `text`
    pub upstream_response_modality: Option<String>,

    // Provider API keys
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,

    // Relay
    /// Frames buffered per call before streaming starts
    pub pending_audio_capacity: usize,
    /// Silence keepalive interval, disabled when `None`
    pub keepalive_interval_ms: Option<u64>,
    pub drain_timeout_ms: u64,
    /// Create sessions for media streams of unknown calls
    pub adopt_unregistered_streams: bool,
    /// `native` or `ffmpeg`
    pub transcoder_backend: String,
    pub ffmpeg_path: String,
    /// Speak final assistant transcripts through TTS
    pub synthesize_transcripts: bool,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
    /// Maximum requests per second per IP address
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            tls: None,
            public_host: None,
            telnyx_api_key: None,
            telnyx_api_url: TELNYX_API_BASE.to_string(),
            upstream_provider: UpstreamProvider::OpenAI.as_str().to_string(),
            upstream_model: None,
            upstream_voice: None,
            upstream_instructions: None,
            upstream_endpoint: None,
            upstream_audio_format: None,
            upstream_response_modality: None,
            openai_api_key: None,
            gemini_api_key: None,
            pending_audio_capacity: DEFAULT_PENDING_AUDIO_CAPACITY,
            keepalive_interval_ms: None,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
            adopt_unregistered_streams: true,
            transcoder_backend: TranscoderBackend::default().as_str().to_string(),
            ffmpeg_path: DEFAULT_FFMPEG_PATH.to_string(),
            synthesize_transcripts: false,
            tts_model: None,
            tts_voice: None,
            cors_allowed_origins: None,
            rate_limit_requests_per_second: 60,
            rate_limit_burst_size: 10,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.telnyx_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.gemini_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    ///
    /// `.env` values are loaded into the environment by `main` before this runs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        env::apply_env(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base values.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, an environment
    /// variable is malformed, or the merged configuration fails validation.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        merge::apply_yaml(&mut config, yaml_config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Selected upstream provider, OpenAI when unrecognized.
    pub fn upstream_provider(&self) -> UpstreamProvider {
        UpstreamProvider::parse(&self.upstream_provider).unwrap_or(UpstreamProvider::OpenAI)
    }

    /// API key for an upstream provider.
    pub fn upstream_api_key(&self, provider: UpstreamProvider) -> Result<String, ConfigError> {
        let (key, name) = match provider {
            UpstreamProvider::OpenAI => (&self.openai_api_key, "OPENAI_API_KEY"),
            UpstreamProvider::Gemini => (&self.gemini_api_key, "GEMINI_API_KEY"),
        };
        key.clone().ok_or_else(|| ConfigError::MissingKey {
            key: name.to_string(),
            purpose: format!("the {provider} upstream"),
        })
    }

    /// Upstream session configuration shared by every call.
    pub fn upstream_config(&self) -> Result<UpstreamConfig, ConfigError> {
        let provider = self.upstream_provider();
        Ok(UpstreamConfig {
            api_key: self.upstream_api_key(provider)?,
            provider: provider.as_str().to_string(),
            model: self.upstream_model.clone().unwrap_or_default(),
            voice: self.upstream_voice.clone(),
            instructions: self.upstream_instructions.clone(),
            endpoint: self.upstream_endpoint.clone(),
            audio_format: self.upstream_audio_format.clone(),
            response_modality: self.upstream_response_modality.clone(),
        })
    }

    pub fn transcoder_backend(&self) -> TranscoderBackend {
        TranscoderBackend::parse(&self.transcoder_backend).unwrap_or_default()
    }

    /// Relay and per-session tuning.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            session: SessionSettings {
                pending_audio_capacity: self.pending_audio_capacity,
                keepalive_interval: self.keepalive_interval_ms.map(Duration::from_millis),
                drain_timeout: Duration::from_millis(self.drain_timeout_ms),
                synthesize_transcripts: self.synthesize_transcripts,
            },
            adopt_unregistered_streams: self.adopt_unregistered_streams,
        }
    }

    /// Speech synthesis configuration, when transcript synthesis is enabled.
    pub fn tts_config(&self) -> Option<TTSConfig> {
        if !self.synthesize_transcripts {
            return None;
        }
        let api_key = self.openai_api_key.clone()?;
        Some(TTSConfig {
            api_key,
            model: self.tts_model.clone().unwrap_or_default(),
            voice_id: self.tts_voice.clone(),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    const ENV_KEYS: &[&str] = &[
        "HOST",
        "PORT",
        "PUBLIC_HOST",
        "TLS_CERT_PATH",
        "TLS_KEY_PATH",
        "TELNYX_API_KEY",
        "TELNYX_API_URL",
        "UPSTREAM_PROVIDER",
        "UPSTREAM_MODEL",
        "UPSTREAM_VOICE",
        "UPSTREAM_INSTRUCTIONS",
        "UPSTREAM_ENDPOINT",
        "UPSTREAM_AUDIO_FORMAT",
        "UPSTREAM_RESPONSE_MODALITY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "PENDING_AUDIO_CAPACITY",
        "KEEPALIVE_INTERVAL_MS",
        "DRAIN_TIMEOUT_MS",
        "ADOPT_UNREGISTERED_STREAMS",
        "TRANSCODER_BACKEND",
        "FFMPEG_PATH",
        "SYNTHESIZE_TRANSCRIPTS",
        "TTS_MODEL",
        "TTS_VOICE",
        "CORS_ALLOWED_ORIGINS",
        "RATE_LIMIT_REQUESTS_PER_SECOND",
        "RATE_LIMIT_BURST_SIZE",
        "MAX_WEBSOCKET_CONNECTIONS",
        "MAX_CONNECTIONS_PER_IP",
    ];

    // Helper to clean up environment variables
    fn cleanup_env_vars() {
        unsafe {
            for key in ENV_KEYS {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.address(), "0.0.0.0:3000");
        assert!(!config.is_tls_enabled());
        assert_eq!(config.upstream_provider(), UpstreamProvider::OpenAI);
        assert_eq!(config.transcoder_backend(), TranscoderBackend::Native);

        let relay = config.relay_settings();
        assert_eq!(relay.session.pending_audio_capacity, 250);
        assert_eq!(relay.session.drain_timeout, Duration::from_millis(5000));
        assert!(relay.session.keepalive_interval.is_none());
        assert!(relay.adopt_unregistered_streams);
    }

    #[test]
    fn test_upstream_config_requires_key() {
        let mut config = ServerConfig::default();
        assert!(matches!(
            config.upstream_config(),
            Err(ConfigError::MissingKey { .. })
        ));

        config.upstream_provider = "gemini".to_string();
        config.gemini_api_key = Some("g-key".to_string());
        config.upstream_model = Some("models/gemini-2.0-flash-exp".to_string());
        config.upstream_response_modality = Some("text".to_string());

        let upstream = config.upstream_config().unwrap();
        assert_eq!(upstream.provider, "gemini");
        assert_eq!(upstream.api_key, "g-key");
        assert_eq!(upstream.model, "models/gemini-2.0-flash-exp");
        assert!(upstream.text_only());
    }

    #[test]
    fn test_tts_config_only_when_enabled() {
        let mut config = ServerConfig::default();
        config.openai_api_key = Some("sk-test".to_string());
        assert!(config.tts_config().is_none());

        config.synthesize_transcripts = true;
        config.tts_voice = Some("nova".to_string());
        let tts = config.tts_config().unwrap();
        assert_eq!(tts.api_key, "sk-test");
        assert_eq!(tts.voice_id.as_deref(), Some("nova"));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        cleanup_env_vars();
        unsafe {
            env::set_var("PORT", "8080");
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("PENDING_AUDIO_CAPACITY", "10");
            env::set_var("KEEPALIVE_INTERVAL_MS", "1000");
            env::set_var("ADOPT_UNREGISTERED_STREAMS", "false");
            env::set_var("TRANSCODER_BACKEND", "ffmpeg");
        }

        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.transcoder_backend(), TranscoderBackend::Ffmpeg);

        let relay = config.relay_settings();
        assert_eq!(relay.session.pending_audio_capacity, 10);
        assert_eq!(
            relay.session.keepalive_interval,
            Some(Duration::from_millis(1000))
        );
        assert!(!relay.adopt_unregistered_streams);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_values() {
        cleanup_env_vars();
        unsafe {
            env::set_var("OPENAI_API_KEY", "sk-env");
            env::set_var("PORT", "not-a-port");
        }
        assert_eq!(
            ServerConfig::from_env().unwrap_err(),
            ConfigError::InvalidValue {
                key: "PORT".to_string(),
                value: "not-a-port".to_string(),
            }
        );

        unsafe {
            env::remove_var("PORT");
            env::set_var("PENDING_AUDIO_CAPACITY", "0");
        }
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Invalid(_))
        ));

        unsafe {
            env::remove_var("PENDING_AUDIO_CAPACITY");
            env::set_var("UPSTREAM_PROVIDER", "watson");
        }
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidValue { .. })
        ));

        unsafe {
            env::remove_var("UPSTREAM_PROVIDER");
            env::set_var("TLS_CERT_PATH", "/tmp/cert.pem");
        }
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::Invalid(_))
        ));

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_env_missing_provider_key() {
        cleanup_env_vars();
        unsafe {
            env::set_var("UPSTREAM_PROVIDER", "gemini");
            env::set_var("OPENAI_API_KEY", "sk-env");
        }
        let err = ServerConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_yaml_overrides_env() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let yaml_content = r#"
server:
  host: "127.0.0.1"
  port: 8080
  public_host: "relay.example.com"

providers:
  openai_api_key: "yaml-key"

relay:
  drain_timeout_ms: 2000
"#;
        fs::write(&config_path, yaml_content).unwrap();

        unsafe {
            env::set_var("HOST", "10.0.0.1");
            env::set_var("OPENAI_API_KEY", "env-key");
            env::set_var("TELNYX_API_KEY", "telnyx-env");
        }

        let config = ServerConfig::from_file(&config_path).unwrap();

        // YAML overrides ENV
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.openai_api_key.as_deref(), Some("yaml-key"));
        // ENV fills what YAML leaves out
        assert_eq!(config.telnyx_api_key.as_deref(), Some("telnyx-env"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.public_host.as_deref(), Some("relay.example.com"));
        assert_eq!(config.drain_timeout_ms, 2000);

        cleanup_env_vars();
    }

    #[test]
    #[serial]
    fn test_from_file_missing_file() {
        cleanup_env_vars();

        let result = ServerConfig::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }

    #[test]
    #[serial]
    fn test_from_file_tls_requires_both_paths() {
        cleanup_env_vars();

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(
            &config_path,
            r#"
server:
  tls:
    cert_path: "/etc/cert.pem"
providers:
  openai_api_key: "sk"
"#,
        )
        .unwrap();

        assert!(matches!(
            ServerConfig::from_file(&config_path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
