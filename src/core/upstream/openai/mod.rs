//! OpenAI Realtime API upstream.
//!
//! Bidirectional audio with server-side VAD, caller transcription
//! (`whisper-1`) and synthesized replies. With `g711_ulaw` the telephony
//! audio is forwarded untouched; with `pcm16` it is transcoded to 24 kHz.

mod client;
mod config;
mod messages;

pub use client::OpenAIRealtime;
pub use config::{
    OPENAI_REALTIME_DEFAULT_MODEL, OPENAI_REALTIME_SAMPLE_RATE, OPENAI_REALTIME_URL,
    OpenAIRealtimeAudioFormat, OpenAIRealtimeVoice,
};
pub use messages::{ClientEvent, ServerEvent, SessionConfig, TurnDetection};
