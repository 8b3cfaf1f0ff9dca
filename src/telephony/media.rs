//! Media stream WebSocket message types.
//!
//! Twilio and Telnyx both speak an `event`-tagged JSON protocol on the media
//! socket. They differ only in field naming (`streamSid`/`callSid` versus
//! `stream_id`/`call_control_id`), so one set of types accepts both.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::codec::{AudioEncoding, AudioFormat};

/// Maximum decoded size of one inbound media payload (1 MB)
pub const MAX_MEDIA_PAYLOAD_SIZE: usize = 1024 * 1024;

// =============================================================================
// Incoming Messages (Carrier -> Server)
// =============================================================================

/// Messages received on the media socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum IncomingMediaMessage {
    /// Socket established; no call yet
    Connected {
        #[serde(default)]
        protocol: Option<String>,
        #[serde(default)]
        version: Option<String>,
    },

    /// Stream metadata, including the call id
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stream_id: Option<String>,
        start: StartPayload,
    },

    /// One chunk of caller audio
    Media {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stream_id: Option<String>,
        media: MediaPayload,
    },

    /// Stream ended
    Stop {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stream_id: Option<String>,
        #[serde(default)]
        stop: Option<StopPayload>,
    },

    /// Playback marker reached
    Mark {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stream_id: Option<String>,
        #[serde(default)]
        mark: Option<MarkPayload>,
    },

    /// Keypad digit
    Dtmf {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        #[serde(default)]
        stream_id: Option<String>,
        #[serde(default)]
        dtmf: Option<DtmfPayload>,
    },

    /// Any other event
    #[serde(other)]
    Unknown,
}

impl IncomingMediaMessage {
    /// Event name for logs.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Stop { .. } => "stop",
            Self::Mark { .. } => "mark",
            Self::Dtmf { .. } => "dtmf",
            Self::Unknown => "unknown",
        }
    }

    /// Stream id of the message, under whichever name the carrier used.
    pub fn stream_tag(&self) -> StreamTag {
        match self {
            Self::Start {
                stream_sid,
                stream_id,
                ..
            }
            | Self::Media {
                stream_sid,
                stream_id,
                ..
            }
            | Self::Stop {
                stream_sid,
                stream_id,
                ..
            }
            | Self::Mark {
                stream_sid,
                stream_id,
                ..
            }
            | Self::Dtmf {
                stream_sid,
                stream_id,
                ..
            } => StreamTag {
                stream_sid: stream_sid.clone(),
                stream_id: stream_id.clone(),
            },
            Self::Connected { .. } | Self::Unknown => StreamTag::default(),
        }
    }
}

/// Stream identifier, under whichever name the carrier uses.
///
/// Echoed back on outbound messages so replies carry the same field the
/// carrier sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamTag {
    /// Twilio stream id
    pub stream_sid: Option<String>,
    /// Telnyx stream id
    pub stream_id: Option<String>,
}

impl StreamTag {
    pub fn id(&self) -> Option<&str> {
        self.stream_sid.as_deref().or(self.stream_id.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.id().is_none()
    }
}

/// Payload of the `start` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartPayload {
    /// Call id (`callSid` on Twilio, `call_control_id` on Telnyx)
    #[serde(rename = "callSid", alias = "call_control_id", default)]
    pub call_id: Option<String>,

    /// Twilio repeats the stream id inside `start`
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,

    #[serde(rename = "mediaFormat", alias = "media_format", default)]
    pub media_format: Option<MediaFormat>,

    #[serde(default)]
    pub tracks: Vec<String>,
}

/// Audio format announced in `start`.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaFormat {
    /// `audio/x-mulaw` (Twilio) or `PCMU` (Telnyx)
    pub encoding: String,
    #[serde(rename = "sampleRate", alias = "sample_rate")]
    pub sample_rate: u32,
    #[serde(default)]
    pub channels: Option<u32>,
}

impl MediaFormat {
    /// Format tag, if the encoding is one the relay understands.
    pub fn audio_format(&self) -> Option<AudioFormat> {
        let encoding = self.encoding.to_lowercase();
        let encoding = if encoding.contains("mulaw") || encoding.contains("pcmu") {
            AudioEncoding::Mulaw
        } else if encoding.contains("l16") || encoding.contains("pcm16") {
            AudioEncoding::Pcm16
        } else {
            return None;
        };
        Some(AudioFormat::new(encoding, self.sample_rate))
    }
}

/// Payload of the `media` event.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaPayload {
    /// Base64 audio
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl MediaPayload {
    /// Caller audio; outbound echoes are skipped.
    pub fn is_inbound(&self) -> bool {
        self.track
            .as_deref()
            .is_none_or(|track| track.starts_with("inbound"))
    }

    /// Decode the base64 payload.
    pub fn decode(&self) -> Result<Vec<u8>, String> {
        // base64 expands by 4/3; reject before allocating
        if self.payload.len() / 4 * 3 > MAX_MEDIA_PAYLOAD_SIZE {
            return Err(format!(
                "media payload exceeds {MAX_MEDIA_PAYLOAD_SIZE} bytes"
            ));
        }
        BASE64_STANDARD
            .decode(self.payload.trim())
            .map_err(|e| e.to_string())
    }
}

/// Payload of the `stop` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StopPayload {
    #[serde(rename = "callSid", alias = "call_control_id", default)]
    pub call_id: Option<String>,
}

/// Payload of the `mark` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MarkPayload {
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of the `dtmf` event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DtmfPayload {
    #[serde(default)]
    pub digit: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
}

// =============================================================================
// Outgoing Messages (Server -> Carrier)
// =============================================================================

/// Messages sent on the media socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum OutgoingMediaMessage {
    /// Audio for the caller, µ-law 8 kHz
    Media {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        media: OutgoingMedia,
    },

    /// Discard queued playback
    Clear {
        #[serde(rename = "streamSid", skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMedia {
    /// Base64 audio
    pub payload: String,
}

impl OutgoingMediaMessage {
    pub fn media(stream: &StreamTag, audio: &[u8]) -> Self {
        Self::Media {
            stream_sid: stream.stream_sid.clone(),
            stream_id: stream.stream_id.clone(),
            media: OutgoingMedia {
                payload: BASE64_STANDARD.encode(audio),
            },
        }
    }

    pub fn clear(stream: &StreamTag) -> Self {
        Self::Clear {
            stream_sid: stream.stream_sid.clone(),
            stream_id: stream.stream_id.clone(),
        }
    }
}
