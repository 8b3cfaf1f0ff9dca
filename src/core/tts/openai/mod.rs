//! OpenAI text-to-speech.

mod config;
mod provider;

pub use config::{
    OPENAI_TTS_FORMAT, OPENAI_TTS_SAMPLE_RATE, OPENAI_TTS_URL, OpenAITTSModel, OpenAIVoice,
};
pub use provider::OpenAITTS;
