//! Media stream WebSocket handler
//!
//! Carriers open one socket per call and speak `event`-tagged JSON.
//!
//! ## Carrier → Server
//!
//! - **connected**: socket established
//! - **start**: call id and stream id; binds the socket to the call's session
//! - **media**: base64 µ-law 8 kHz caller audio
//! - **stop**: stream ended; stops the session
//! - **mark** / **dtmf**: logged
//!
//! ## Server → Carrier
//!
//! - **media**: base64 µ-law 8 kHz reply audio, tagged with the stream id
//! - **clear**: drop queued playback (caller barge-in)

mod handler;

pub use handler::media_stream_handler;
