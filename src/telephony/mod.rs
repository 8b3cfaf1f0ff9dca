//! Carrier-facing integrations.
//!
//! - `control` - call control abstraction used by sessions
//! - `media` - media stream WebSocket messages (Twilio and Telnyx framing)
//! - `telnyx` - Telnyx Call Control REST client
//! - `twiml` - TwiML for Twilio voice webhooks
//! - `webhooks` - carrier webhook payloads

pub mod control;
pub mod media;
pub mod telnyx;
pub mod twiml;
pub mod webhooks;

pub use control::{
    CallControl, NoopCallControl, SharedCallControl, TelephonyError, TelephonyResult,
};
pub use media::{IncomingMediaMessage, OutgoingMediaMessage, StreamTag};
pub use telnyx::{TELNYX_API_BASE, TelnyxCallControl, TelnyxClient};
pub use twiml::{MEDIA_STREAM_PATH, connect_stream, media_stream_url};
pub use webhooks::{TelnyxEventType, TelnyxWebhook, TwilioStatusRequest, TwilioVoiceRequest};
