//! Audio transcoder module.
//!
//! # Backends
//!
//! - **native** - in-process G.711 decode + linear resampling (default)
//! - **ffmpeg** - external `ffmpeg` process fed over stdin/stdout
//!
//! When the upstream accepts the telephony format directly the native backend
//! runs as a passthrough.

mod base;
pub mod ffmpeg;
pub mod native;

pub use base::{
    BoxedTranscoder, PipelineState, Transcoder, TranscoderError, TranscoderEvent,
    TranscoderResult,
};
pub use ffmpeg::{DEFAULT_FFMPEG_PATH, FfmpegConfig, FfmpegTranscoder};
pub use native::NativeTranscoder;

use crate::core::codec::AudioFormat;

/// Minimum input queue capacity, in chunks (about 5 seconds of 20 ms frames).
pub const DEFAULT_TRANSCODER_QUEUE: usize = 256;

/// Supported transcoder backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranscoderBackend {
    /// In-process converter
    #[default]
    Native,
    /// External ffmpeg process
    Ffmpeg,
}

impl TranscoderBackend {
    /// Parse backend from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "native" | "builtin" | "in-process" => Some(Self::Native),
            "ffmpeg" => Some(Self::Ffmpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Ffmpeg => "ffmpeg",
        }
    }
}

impl std::fmt::Display for TranscoderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Factory function to create a transcoder for one call.
///
/// Identical input and output formats always get the native passthrough,
/// regardless of the configured backend; there is nothing to spawn ffmpeg for.
///
/// The input queue holds at least `queue_capacity` chunks and never fewer than
/// [`DEFAULT_TRANSCODER_QUEUE`], so a caller can push a whole backlog of that
/// size in one go without losing any of it.
pub fn create_transcoder(
    backend: TranscoderBackend,
    input: AudioFormat,
    output: AudioFormat,
    ffmpeg_path: &str,
    queue_capacity: usize,
) -> TranscoderResult<BoxedTranscoder> {
    let queue_capacity = queue_capacity.max(DEFAULT_TRANSCODER_QUEUE);

    if input == output {
        return Ok(Box::new(NativeTranscoder::new(input, output, queue_capacity)));
    }

    match backend {
        TranscoderBackend::Native => Ok(Box::new(NativeTranscoder::new(
            input,
            output,
            queue_capacity,
        ))),
        TranscoderBackend::Ffmpeg => Ok(Box::new(FfmpegTranscoder::new(FfmpegConfig {
            binary: ffmpeg_path.to_string(),
            input,
            output,
            queue_capacity,
        })?)),
    }
}

/// Get list of supported transcoder backends.
pub fn get_supported_transcoder_backends() -> Vec<&'static str> {
    vec!["native", "ffmpeg"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_parse() {
        assert_eq!(
            TranscoderBackend::parse("FFMPEG"),
            Some(TranscoderBackend::Ffmpeg)
        );
        assert_eq!(
            TranscoderBackend::parse("native"),
            Some(TranscoderBackend::Native)
        );
        assert_eq!(TranscoderBackend::parse("sox"), None);
    }

    #[test]
    fn test_factory_picks_backend() {
        let t = create_transcoder(
            TranscoderBackend::Ffmpeg,
            AudioFormat::TELEPHONY,
            AudioFormat::pcm16(24000),
            DEFAULT_FFMPEG_PATH,
            DEFAULT_TRANSCODER_QUEUE,
        )
        .unwrap();
        assert_eq!(t.name(), "ffmpeg");
        assert_eq!(t.output_format(), AudioFormat::pcm16(24000));

        let t = create_transcoder(
            TranscoderBackend::Ffmpeg,
            AudioFormat::TELEPHONY,
            AudioFormat::TELEPHONY,
            DEFAULT_FFMPEG_PATH,
            DEFAULT_TRANSCODER_QUEUE,
        )
        .unwrap();
        assert_eq!(t.name(), "passthrough");

        let t = create_transcoder(
            TranscoderBackend::Native,
            AudioFormat::TELEPHONY,
            AudioFormat::pcm16(16000),
            DEFAULT_FFMPEG_PATH,
            DEFAULT_TRANSCODER_QUEUE,
        )
        .unwrap();
        assert_eq!(t.name(), "native");
    }

    #[tokio::test]
    async fn test_queue_holds_requested_backlog() {
        let mut transcoder = create_transcoder(
            TranscoderBackend::Native,
            AudioFormat::TELEPHONY,
            AudioFormat::TELEPHONY,
            DEFAULT_FFMPEG_PATH,
            DEFAULT_TRANSCODER_QUEUE + 144,
        )
        .unwrap();
        // Nobody drains events, so the worker stalls after the first chunk
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        transcoder.start(tx).await.unwrap();

        let accepted = (0..DEFAULT_TRANSCODER_QUEUE + 144)
            .filter(|_| transcoder.push(bytes::Bytes::from_static(&[0xFF; 160])))
            .count();
        assert_eq!(accepted, DEFAULT_TRANSCODER_QUEUE + 144);
    }

    #[test]
    fn test_supported_backends() {
        assert_eq!(get_supported_transcoder_backends(), vec!["native", "ffmpeg"]);
    }
}
