//! Gemini Live API upstream.
//!
//! Streams caller audio as 16 kHz PCM and relays the model's 24 kHz PCM
//! replies. Caller and model speech are transcribed by the service and
//! surfaced as transcripts at the end of each turn.

mod client;
mod config;
mod messages;

pub use client::GeminiLive;
pub use config::{
    GEMINI_INPUT_FORMAT, GEMINI_LIVE_DEFAULT_MODEL, GEMINI_LIVE_URL, GEMINI_OUTPUT_FORMAT,
    GEMINI_VOICES,
};
pub use messages::{ClientMessage, ServerMessage};
