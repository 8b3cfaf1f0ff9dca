//! Text-to-speech fallback.
//!
//! Backends configured for text replies produce transcripts only. When
//! synthesis is enabled, each final assistant transcript is spoken through
//! a [`SpeechSynthesizer`] and relayed to the caller.

mod base;
pub mod openai;

pub use base::{
    SharedSynthesizer, SpeechSynthesizer, SynthesizedSpeech, TTSConfig, TTSError, TTSResult,
};
pub use openai::{OPENAI_TTS_URL, OpenAITTS};

use std::sync::Arc;

/// Factory function to create a synthesizer.
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI speech API
pub fn create_tts_provider(provider: &str, config: TTSConfig) -> TTSResult<SharedSynthesizer> {
    match provider.trim().to_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAITTS::new(config)?)),
        other => Err(TTSError::InvalidConfiguration(format!(
            "Unsupported TTS provider: '{other}'. Supported providers: openai"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tts_provider() {
        let config = TTSConfig {
            api_key: "sk-test".to_string(),
            ..Default::default()
        };
        let tts = create_tts_provider("OpenAI", config.clone()).unwrap();
        assert_eq!(tts.provider_name(), "openai");

        assert!(matches!(
            create_tts_provider("polly", config),
            Err(TTSError::InvalidConfiguration(_))
        ));
    }
}
