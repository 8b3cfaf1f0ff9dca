//! Upstream AI session module.
//!
//! One persistent streaming connection per call to a speech/LLM backend.
//!
//! # Supported Providers
//!
//! - **OpenAI Realtime API** - `pcm16` at 24 kHz or `g711_ulaw` passthrough
//! - **Gemini Live** - PCM 16 kHz in, PCM 24 kHz out
//!
//! # Architecture
//!
//! - `BaseUpstream` trait for provider abstraction
//! - Factory function for config-driven provider creation
//! - Event channel instead of callbacks; one shared connection task
//!   (`connection.rs`) owns the socket for every provider

mod base;
mod connection;
pub mod gemini;
pub mod openai;

pub use base::{
    BaseUpstream, BoxedUpstream, ConnectionState, TranscriptResult, TranscriptRole, UpstreamAudio,
    UpstreamConfig, UpstreamError, UpstreamEvent, UpstreamResult,
};
pub use gemini::GeminiLive;
pub use openai::OpenAIRealtime;

/// Supported upstream providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamProvider {
    /// OpenAI Realtime API
    OpenAI,
    /// Google Gemini Live API
    Gemini,
}

impl UpstreamProvider {
    /// Parse provider from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "openai-realtime" | "openai_realtime" => Some(UpstreamProvider::OpenAI),
            "gemini" | "gemini-live" | "gemini_live" | "google" => Some(UpstreamProvider::Gemini),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProvider::OpenAI => "openai",
            UpstreamProvider::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for UpstreamProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Factory function to create an upstream session from configuration.
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI Realtime API
/// - `"gemini"` - Gemini Live API
pub fn create_upstream_session(config: UpstreamConfig) -> UpstreamResult<BoxedUpstream> {
    let provider = UpstreamProvider::parse(&config.provider).ok_or_else(|| {
        UpstreamError::InvalidConfiguration(format!(
            "Unsupported upstream provider: '{}'. Supported providers: {}",
            config.provider,
            get_supported_upstream_providers().join(", ")
        ))
    })?;

    match provider {
        UpstreamProvider::OpenAI => Ok(Box::new(OpenAIRealtime::new(config)?)),
        UpstreamProvider::Gemini => Ok(Box::new(GeminiLive::new(config)?)),
    }
}

/// Get list of supported upstream providers.
pub fn get_supported_upstream_providers() -> Vec<&'static str> {
    vec!["openai", "gemini"]
}
