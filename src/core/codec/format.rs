//! Audio format tags carried by every frame that moves through a call.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sample rate of the telephony leg (G.711 narrowband).
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Duration of one telephony media packet in milliseconds.
pub const TELEPHONY_FRAME_MS: u32 = 20;

// =============================================================================
// Encoding
// =============================================================================

/// Sample encoding of an audio buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    /// G.711 µ-law, one byte per sample
    #[default]
    Mulaw,
    /// Linear PCM, 16-bit signed little-endian
    Pcm16,
}

impl AudioEncoding {
    /// Short name used in config values and logs.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mulaw => "mulaw",
            Self::Pcm16 => "pcm16",
        }
    }

    /// Bytes occupied by a single mono sample.
    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Mulaw => 1,
            Self::Pcm16 => 2,
        }
    }

    /// Raw format name understood by `ffmpeg -f`.
    #[inline]
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            Self::Mulaw => "mulaw",
            Self::Pcm16 => "s16le",
        }
    }

    /// Parse an encoding name as sent by telephony providers or written in config.
    ///
    /// Accepts MIME style names (`audio/x-mulaw`), RTP payload names (`PCMU`, `L16`)
    /// and the short names returned by [`AudioEncoding::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mulaw" | "ulaw" | "g711_ulaw" | "pcmu" | "audio/x-mulaw" | "audio/pcmu" => {
                Some(Self::Mulaw)
            }
            "pcm16" | "pcm" | "linear16" | "s16le" | "l16" | "audio/x-l16" | "audio/l16" => {
                Some(Self::Pcm16)
            }
            _ => None,
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Format
// =============================================================================

/// Encoding plus sample rate of a mono audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::TELEPHONY
    }
}

impl AudioFormat {
    /// µ-law at 8 kHz, the format of Twilio and Telnyx media streams.
    pub const TELEPHONY: AudioFormat = AudioFormat::mulaw(TELEPHONY_SAMPLE_RATE);

    pub const fn new(encoding: AudioEncoding, sample_rate: u32) -> Self {
        Self {
            encoding,
            sample_rate,
        }
    }

    pub const fn mulaw(sample_rate: u32) -> Self {
        Self::new(AudioEncoding::Mulaw, sample_rate)
    }

    pub const fn pcm16(sample_rate: u32) -> Self {
        Self::new(AudioEncoding::Pcm16, sample_rate)
    }

    /// Number of bytes per millisecond of audio.
    #[inline]
    pub fn bytes_per_ms(&self) -> usize {
        (self.sample_rate as usize * self.encoding.bytes_per_sample()) / 1000
    }

    /// Duration in milliseconds of `len` bytes in this format.
    #[inline]
    pub fn duration_ms(&self, len: usize) -> u64 {
        let per_ms = self.bytes_per_ms();
        if per_ms == 0 {
            0
        } else {
            (len / per_ms) as u64
        }
    }

    /// A buffer of digital silence lasting `duration_ms`.
    pub fn silence(&self, duration_ms: u32) -> Bytes {
        let len = self.bytes_per_ms() * duration_ms as usize;
        let fill = match self.encoding {
            // µ-law code for a zero-amplitude sample
            AudioEncoding::Mulaw => 0xFF,
            AudioEncoding::Pcm16 => 0x00,
        };
        Bytes::from(vec![fill; len])
    }

    /// Parse `encoding[_rate]`, e.g. `mulaw_8000`, `pcm16_24000` or `g711_ulaw`.
    ///
    /// When the rate is omitted, µ-law defaults to 8 kHz and PCM to 16 kHz.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((name, rate)) = s.rsplit_once(['_', '@', ':'])
            && let Ok(rate) = rate.trim_end_matches("hz").trim_end_matches("Hz").parse::<u32>()
            && rate > 0
        {
            return AudioEncoding::parse(name).map(|encoding| Self::new(encoding, rate));
        }

        AudioEncoding::parse(s).map(|encoding| match encoding {
            AudioEncoding::Mulaw => Self::mulaw(TELEPHONY_SAMPLE_RATE),
            AudioEncoding::Pcm16 => Self::pcm16(16000),
        })
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}Hz", self.encoding, self.sample_rate)
    }
}

// =============================================================================
// Frame
// =============================================================================

/// One chunk of inbound call audio.
///
/// The sequence number increases monotonically per media socket and exists for
/// ordering diagnostics only; the transport already delivers frames in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Bytes,
    pub format: AudioFormat,
    pub sequence: u64,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, format: AudioFormat, sequence: u64) -> Self {
        Self {
            data: data.into(),
            format,
            sequence,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Playback duration of this frame in milliseconds.
    #[inline]
    pub fn duration_ms(&self) -> u64 {
        self.format.duration_ms(self.data.len())
    }
}
