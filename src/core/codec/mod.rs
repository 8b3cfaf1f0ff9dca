//! In-process audio conversion.
//!
//! The telephony leg speaks G.711 µ-law at 8 kHz while upstream backends want
//! linear PCM at their own rate (or µ-law, for backends that accept it
//! directly). This module holds the format tags that travel with every frame
//! and a stateful [`FormatConverter`] built from the G.711 codec and a linear
//! resampler. The native transcoder and the reply path both use it.

mod format;
mod g711;
mod resample;

use bytes::Bytes;

pub use format::{
    AudioEncoding, AudioFormat, AudioFrame, TELEPHONY_FRAME_MS, TELEPHONY_SAMPLE_RATE,
};
pub use g711::{decode_mulaw, encode_mulaw, mulaw_decode_sample, mulaw_encode_sample};
pub use resample::{LinearResampler, resample};

/// Decode little-endian 16-bit PCM bytes, appending samples to `out`.
///
/// A trailing odd byte is ignored; use [`FormatConverter`] for streams that
/// may split samples across chunks.
pub fn pcm16le_to_samples(input: &[u8], out: &mut Vec<i16>) {
    out.reserve(input.len() / 2);
    out.extend(
        input
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
    );
}

/// Encode samples as little-endian 16-bit PCM bytes.
pub fn samples_to_pcm16le(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Stateful converter between two audio formats for one stream.
///
/// Keeps resampler phase and any half sample split across chunk boundaries,
/// so feeding a stream chunk by chunk yields the same output as converting it
/// in one piece.
#[derive(Debug, Clone)]
pub struct FormatConverter {
    from: AudioFormat,
    to: AudioFormat,
    resampler: LinearResampler,
    /// Odd trailing byte of a PCM16 input chunk
    pending_byte: Option<u8>,
    samples: Vec<i16>,
    resampled: Vec<i16>,
}

impl FormatConverter {
    pub fn new(from: AudioFormat, to: AudioFormat) -> Self {
        Self {
            from,
            to,
            resampler: LinearResampler::new(from.sample_rate, to.sample_rate),
            pending_byte: None,
            samples: Vec::new(),
            resampled: Vec::new(),
        }
    }

    pub fn from_format(&self) -> AudioFormat {
        self.from
    }

    pub fn to_format(&self) -> AudioFormat {
        self.to
    }

    /// True when input already matches the output format.
    #[inline]
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Convert one chunk. Returns an empty buffer when the chunk did not
    /// complete any output sample.
    pub fn convert(&mut self, input: &[u8]) -> Bytes {
        if self.is_identity() {
            return Bytes::copy_from_slice(input);
        }

        self.samples.clear();
        match self.from.encoding {
            AudioEncoding::Mulaw => decode_mulaw(input, &mut self.samples),
            AudioEncoding::Pcm16 => {
                let mut rest = input;
                if let Some((&high, tail)) = rest.split_first()
                    && let Some(low) = self.pending_byte.take()
                {
                    self.samples.push(i16::from_le_bytes([low, high]));
                    rest = tail;
                }
                pcm16le_to_samples(rest, &mut self.samples);
                if rest.len() % 2 == 1 {
                    self.pending_byte = rest.last().copied();
                }
            }
        }

        self.resampled.clear();
        self.resampler.process(&self.samples, &mut self.resampled);

        match self.to.encoding {
            AudioEncoding::Pcm16 => Bytes::from(samples_to_pcm16le(&self.resampled)),
            AudioEncoding::Mulaw => {
                let mut out = Vec::with_capacity(self.resampled.len());
                encode_mulaw(&self.resampled, &mut out);
                Bytes::from(out)
            }
        }
    }

    /// Drop carried state.
    pub fn reset(&mut self) {
        self.resampler.reset();
        self.pending_byte = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copies() {
        let mut converter = FormatConverter::new(AudioFormat::TELEPHONY, AudioFormat::TELEPHONY);
        assert!(converter.is_identity());
        assert_eq!(&converter.convert(&[1, 2, 3])[..], &[1, 2, 3]);
    }

    #[test]
    fn test_mulaw_to_pcm16_same_rate() {
        let mut converter = FormatConverter::new(AudioFormat::TELEPHONY, AudioFormat::pcm16(8000));
        let out = converter.convert(&[0xFF, 0x80]);
        assert_eq!(&out[..], &[0, 0, 0x7C, 0x7D]);
    }

    #[test]
    fn test_mulaw_to_pcm16_upsampled_length() {
        let mut converter =
            FormatConverter::new(AudioFormat::TELEPHONY, AudioFormat::pcm16(16000));
        let silence = AudioFormat::TELEPHONY.silence(TELEPHONY_FRAME_MS);
        let first = converter.convert(&silence);
        let second = converter.convert(&silence);
        // 160 input samples at 2x, one output held back until the next chunk
        assert_eq!(first.len(), 318 * 2);
        assert_eq!(second.len(), 320 * 2);
    }

    #[test]
    fn test_pcm16_odd_split_is_reassembled() {
        let mut converter = FormatConverter::new(AudioFormat::pcm16(8000), AudioFormat::TELEPHONY);
        let bytes = samples_to_pcm16le(&[0, 32124, -32124]);

        let mut out = converter.convert(&bytes[..3]).to_vec();
        out.extend_from_slice(&converter.convert(&bytes[3..]));
        assert_eq!(out, vec![0xFF, 0x80, 0x00]);
    }

    #[test]
    fn test_pcm_helpers() {
        let bytes = samples_to_pcm16le(&[1, -1]);
        assert_eq!(bytes, vec![1, 0, 0xFF, 0xFF]);

        let mut samples = Vec::new();
        pcm16le_to_samples(&bytes, &mut samples);
        assert_eq!(samples, vec![1, -1]);
    }
}
