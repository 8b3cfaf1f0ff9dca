//! Streaming linear-interpolation resampler.
//!
//! Telephony audio is narrowband speech, so linear interpolation is adequate
//! for bridging 8 kHz to the 16/24 kHz rates the upstream backends expect.
//! State carries across calls to [`LinearResampler::process`] so chunk
//! boundaries do not produce discontinuities.

/// Resampler for one mono stream.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    /// Position of the next output frame in units of `1 / to_rate` input frames,
    /// relative to the start of the next chunk. Negative values address the
    /// carried sample.
    position: i64,
    /// Last input sample of the previous chunk
    carry: Option<i16>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Self {
        Self {
            from_rate: from_rate.max(1),
            to_rate: to_rate.max(1),
            position: 0,
            carry: None,
        }
    }

    /// True when input and output rates match and samples pass through untouched.
    #[inline]
    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Resample `input`, appending output samples to `out`.
    pub fn process(&mut self, input: &[i16], out: &mut Vec<i16>) {
        if self.is_passthrough() {
            out.extend_from_slice(input);
            return;
        }
        if input.is_empty() {
            return;
        }

        let len = input.len() as i64;
        let from = self.from_rate as i64;
        let to = self.to_rate as i64;
        let mut pos = self.position;
        out.reserve((input.len() * self.to_rate as usize) / self.from_rate as usize + 1);

        loop {
            let idx = pos.div_euclid(to);
            if idx + 1 >= len {
                break;
            }

            let a = if idx < 0 {
                self.carry.unwrap_or(input[0])
            } else {
                input[idx as usize]
            };
            let b = input[(idx + 1) as usize];
            let frac = pos.rem_euclid(to) as f64 / to as f64;

            let value = a as f64 + (b as f64 - a as f64) * frac;
            out.push(value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16);
            pos += from;
        }

        self.position = pos - len * to;
        self.carry = input.last().copied();
    }

    /// Forget carried state, e.g. after a barge-in discards queued audio.
    pub fn reset(&mut self) {
        self.position = 0;
        self.carry = None;
    }
}

/// One-shot resample of a complete buffer.
pub fn resample(input: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    let mut out = Vec::new();
    LinearResampler::new(from_rate, to_rate).process(input, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let input = vec![1, 2, 3, 4];
        assert_eq!(resample(&input, 16000, 16000), input);
    }

    #[test]
    fn test_upsample_doubles_length() {
        let input: Vec<i16> = (0..160).map(|i| (i * 10) as i16).collect();
        let out = resample(&input, 8000, 16000);
        // Output stops at the last interpolable position; the final half step
        // is emitted with the next chunk.
        assert_eq!(out.len(), 318);
        assert_eq!(out[0], 0);
        assert_eq!(out[1], 5);
        assert_eq!(out[2], 10);
    }

    #[test]
    fn test_downsample_halves_length() {
        let input: Vec<i16> = (0..320).map(|i| i as i16).collect();
        let out = resample(&input, 16000, 8000);
        assert_eq!(out.len(), 160);
        assert_eq!(out[1], 2);
    }

    #[test]
    fn test_chunked_matches_whole() {
        let input: Vec<i16> = (0..480).map(|i| ((i * 37) % 2000) as i16).collect();
        let whole = resample(&input, 8000, 24000);

        let mut chunked = Vec::new();
        let mut resampler = LinearResampler::new(8000, 24000);
        for chunk in input.chunks(160) {
            resampler.process(chunk, &mut chunked);
        }

        assert_eq!(whole, chunked);
    }

    #[test]
    fn test_empty_input_keeps_state() {
        let mut resampler = LinearResampler::new(8000, 16000);
        let mut out = Vec::new();
        resampler.process(&[100, 200], &mut out);
        resampler.process(&[], &mut out);
        resampler.process(&[300], &mut out);
        assert_eq!(out, vec![100, 150, 200, 250]);
    }
}
