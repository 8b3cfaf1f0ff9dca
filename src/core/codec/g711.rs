//! G.711 µ-law companding (ITU-T G.711).
//!
//! Expansion is table driven; the table is built at compile time from the
//! reference expansion formula so encode/decode stay bit-exact with the
//! ITU reference implementation.

/// Bias added to the magnitude before segment search (33 in 14-bit units).
const MULAW_BIAS: i32 = 33;

/// Largest 13-bit magnitude after biasing.
const MULAW_CLIP: i32 = 0x1FFF;

const fn expand(compressed: u8) -> i16 {
    let sign: i32 = if compressed < 0x80 { -1 } else { 1 };
    let inverted = (!compressed) as i32;
    let exponent = (inverted >> 4) & 0x07;
    let mantissa = inverted & 0x0F;
    let step = 4 << (exponent + 1);

    (sign * ((0x80 << exponent) + step * mantissa + step / 2 - 4 * MULAW_BIAS)) as i16
}

const fn build_expand_table() -> [i16; 256] {
    let mut table = [0i16; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = expand(i as u8);
        i += 1;
    }
    table
}

static MULAW_EXPAND: [i16; 256] = build_expand_table();

/// Compress one 16-bit linear sample to µ-law.
#[inline]
pub fn mulaw_encode_sample(sample: i16) -> u8 {
    let magnitude = if sample < 0 {
        ((!sample) as i32 >> 2) + MULAW_BIAS
    } else {
        (sample as i32 >> 2) + MULAW_BIAS
    };
    let magnitude = magnitude.min(MULAW_CLIP);

    let mut segment = 1;
    let mut rest = magnitude >> 6;
    while rest != 0 {
        segment += 1;
        rest >>= 1;
    }

    let high = 0x08 - segment;
    let low = 0x0F - ((magnitude >> segment) & 0x0F);
    let mut code = (high << 4) | low;
    if sample >= 0 {
        code |= 0x80;
    }
    code as u8
}

/// Expand one µ-law byte to a 16-bit linear sample.
#[inline]
pub fn mulaw_decode_sample(code: u8) -> i16 {
    MULAW_EXPAND[code as usize]
}

/// Decode a µ-law buffer, appending linear samples to `out`.
pub fn decode_mulaw(input: &[u8], out: &mut Vec<i16>) {
    out.reserve(input.len());
    out.extend(input.iter().map(|&b| mulaw_decode_sample(b)));
}

/// Encode linear samples, appending µ-law bytes to `out`.
pub fn encode_mulaw(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len());
    out.extend(samples.iter().map(|&s| mulaw_encode_sample(s)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_code() {
        assert_eq!(mulaw_encode_sample(0), 0xFF);
        assert_eq!(mulaw_decode_sample(0xFF), 0);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(mulaw_encode_sample(i16::MAX), 0x80);
        assert_eq!(mulaw_encode_sample(i16::MIN), 0x00);
        assert_eq!(mulaw_decode_sample(0x80), 32124);
        assert_eq!(mulaw_decode_sample(0x00), -32124);
    }

    #[test]
    fn test_decoded_values_are_fixed_points() {
        // Every expanded value must compress back to the code it came from,
        // except negative zero (0x7F) which folds onto positive zero.
        for code in 0u8..=255 {
            let linear = mulaw_decode_sample(code);
            let again = mulaw_encode_sample(linear);
            if code == 0x7F {
                assert_eq!(again, 0xFF);
            } else {
                assert_eq!(again, code, "code {code:#04x} -> {linear}");
            }
        }
    }

    #[test]
    fn test_sign_symmetry() {
        for sample in [100i16, 1000, 8000, 20000] {
            let pos = mulaw_decode_sample(mulaw_encode_sample(sample));
            let neg = mulaw_decode_sample(mulaw_encode_sample(-sample));
            assert!(pos > 0 && neg < 0);
            assert!((pos as i32 + neg as i32).abs() <= 8);
        }
    }

    #[test]
    fn test_buffer_helpers() {
        let mut samples = Vec::new();
        decode_mulaw(&[0xFF, 0x80, 0x00], &mut samples);
        assert_eq!(samples, vec![0, 32124, -32124]);

        let mut encoded = Vec::new();
        encode_mulaw(&samples, &mut encoded);
        assert_eq!(encoded, vec![0xFF, 0x80, 0x00]);
    }
}
