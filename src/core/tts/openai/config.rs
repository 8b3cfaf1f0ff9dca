//! Configuration types for the OpenAI speech API.
//!
//! Replies are always requested as raw `pcm`: 16-bit little-endian mono at
//! 24 kHz, which converts to the telephony leg's µ-law without a decoder.

use serde::{Deserialize, Serialize};

use crate::core::codec::AudioFormat;

/// OpenAI speech endpoint
pub const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

/// Sample rate of `pcm` responses
pub const OPENAI_TTS_SAMPLE_RATE: u32 = 24000;

/// Format of synthesized audio.
pub const OPENAI_TTS_FORMAT: AudioFormat = AudioFormat::pcm16(OPENAI_TTS_SAMPLE_RATE);

// =============================================================================
// Models
// =============================================================================

/// Supported OpenAI TTS models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OpenAITTSModel {
    /// Standard quality, lower latency
    #[default]
    #[serde(rename = "tts-1")]
    Tts1,
    /// High definition, higher latency
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
    #[serde(rename = "gpt-4o-mini-tts")]
    Gpt4oMiniTts,
}

impl OpenAITTSModel {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tts1 => "tts-1",
            Self::Tts1Hd => "tts-1-hd",
            Self::Gpt4oMiniTts => "gpt-4o-mini-tts",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "tts-1" | "tts1" => Self::Tts1,
            "tts-1-hd" | "tts1-hd" | "tts1hd" => Self::Tts1Hd,
            "gpt-4o-mini-tts" | "gpt4o-mini-tts" => Self::Gpt4oMiniTts,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for OpenAITTSModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Voices
// =============================================================================

/// Voices offered by the OpenAI speech API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAIVoice {
    Alloy,
    Ash,
    Coral,
    /// Voice the prototype shipped with
    #[default]
    Echo,
    Fable,
    Onyx,
    Nova,
    Sage,
    Shimmer,
}

impl OpenAIVoice {
    /// Convert to the API parameter value.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
        }
    }

    /// Parse from string, with fallback to default.
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "alloy" => Self::Alloy,
            "ash" => Self::Ash,
            "coral" => Self::Coral,
            "echo" => Self::Echo,
            "fable" => Self::Fable,
            "onyx" => Self::Onyx,
            "nova" => Self::Nova,
            "sage" => Self::Sage,
            "shimmer" => Self::Shimmer,
            _ => Self::default(),
        }
    }
}

impl std::fmt::Display for OpenAIVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_parsing() {
        assert_eq!(OpenAITTSModel::from_str_or_default("TTS-1-HD"), OpenAITTSModel::Tts1Hd);
        assert_eq!(OpenAITTSModel::from_str_or_default("unknown"), OpenAITTSModel::Tts1);
        assert_eq!(OpenAITTSModel::Gpt4oMiniTts.to_string(), "gpt-4o-mini-tts");
    }

    #[test]
    fn test_voice_parsing() {
        assert_eq!(OpenAIVoice::from_str_or_default("Nova"), OpenAIVoice::Nova);
        assert_eq!(OpenAIVoice::from_str_or_default("breeze"), OpenAIVoice::Echo);
        assert_eq!(
            serde_json::to_string(&OpenAIVoice::Shimmer).unwrap(),
            "\"shimmer\""
        );
    }

    #[test]
    fn test_output_format() {
        assert_eq!(OPENAI_TTS_FORMAT.sample_rate, 24000);
        assert_eq!(OPENAI_TTS_FORMAT, AudioFormat::pcm16(24000));
    }
}
