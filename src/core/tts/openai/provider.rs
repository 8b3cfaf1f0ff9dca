//! OpenAI speech synthesizer.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/speech`
//! - Output: `pcm` (24 kHz, 16-bit, mono)
//! - Speed: 0.25 to 4.0

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use super::config::{OPENAI_TTS_FORMAT, OPENAI_TTS_URL, OpenAITTSModel, OpenAIVoice};
use crate::core::tts::base::{
    SpeechSynthesizer, SynthesizedSpeech, TTSConfig, TTSError, TTSResult,
};

/// Upper bound for one synthesis request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI TTS provider.
pub struct OpenAITTS {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: OpenAITTSModel,
    voice: OpenAIVoice,
    speed: f32,
}

impl OpenAITTS {
    pub fn new(config: TTSConfig) -> TTSResult<Self> {
        if config.api_key.is_empty() {
            return Err(TTSError::InvalidConfiguration(
                "API key is required for OpenAI TTS".to_string(),
            ));
        }

        let model = if config.model.is_empty() {
            OpenAITTSModel::default()
        } else {
            OpenAITTSModel::from_str_or_default(&config.model)
        };
        let voice = config
            .voice_id
            .as_deref()
            .map(OpenAIVoice::from_str_or_default)
            .unwrap_or_default();

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TTSError::InvalidConfiguration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key,
            endpoint: config
                .endpoint
                .unwrap_or_else(|| OPENAI_TTS_URL.to_string()),
            model,
            voice,
            speed: config.speaking_rate.unwrap_or(1.0).clamp(0.25, 4.0),
        })
    }

    pub fn model(&self) -> OpenAITTSModel {
        self.model
    }

    pub fn voice(&self) -> OpenAIVoice {
        self.voice
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = json!({
            "model": self.model.as_str(),
            "input": text,
            "voice": self.voice.as_str(),
            "response_format": "pcm",
        });

        if (self.speed - 1.0).abs() > 0.001 {
            body["speed"] = json!(self.speed);
        }
        body
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAITTS {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> TTSResult<SynthesizedSpeech> {
        debug!(chars = text.len(), voice = %self.voice, "Synthesizing speech");

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| TTSError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TTSError::ProviderError {
                status: status.as_u16(),
                body,
            });
        }

        let data: Bytes = response
            .bytes()
            .await
            .map_err(|e| TTSError::RequestFailed(e.to_string()))?;
        if data.is_empty() {
            return Err(TTSError::EmptyAudio);
        }

        Ok(SynthesizedSpeech {
            data,
            format: OPENAI_TTS_FORMAT,
        })
    }
}
