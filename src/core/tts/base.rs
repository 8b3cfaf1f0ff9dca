//! Base trait and types for speech synthesis.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::core::codec::AudioFormat;

/// Errors raised by a speech synthesizer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TTSError {
    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Provider answered with a non-success status
    #[error("Provider error ({status}): {body}")]
    ProviderError { status: u16, body: String },

    /// Provider answered with no audio
    #[error("Provider returned no audio")]
    EmptyAudio,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for synthesis operations.
pub type TTSResult<T> = Result<T, TTSError>;

/// Configuration for a speech synthesizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TTSConfig {
    /// API key for authentication
    pub api_key: String,
    /// Model name; empty selects the provider default
    #[serde(default)]
    pub model: String,
    /// Voice name
    #[serde(default)]
    pub voice_id: Option<String>,
    /// Speaking rate, 1.0 is normal
    #[serde(default)]
    pub speaking_rate: Option<f32>,
    /// Endpoint override
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// One synthesized utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub data: Bytes,
    pub format: AudioFormat,
}

/// Text-to-speech backend used for text-only upstream replies.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Provider name for logs.
    fn provider_name(&self) -> &'static str;

    /// Synthesize `text` into a single audio buffer.
    async fn synthesize(&self, text: &str) -> TTSResult<SynthesizedSpeech>;
}

/// Shared synthesizer handle; one instance serves every call.
pub type SharedSynthesizer = Arc<dyn SpeechSynthesizer>;
