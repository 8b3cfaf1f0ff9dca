//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `media` - Carrier media stream WebSocket
//! - `telnyx` - Telnyx Call Control webhook
//! - `twilio` - Twilio voice and status webhooks

pub mod api;
pub mod media;
pub mod telnyx;
pub mod twilio;

pub use media::media_stream_handler;
