//! PCM16LE decoding.

/// Fixed sample rate for all relayed audio, in Hz.
pub const SAMPLE_RATE: u32 = 24_000;

/// Decode 16-bit signed little-endian PCM into normalized float samples.
///
/// Each sample maps to `s / 32768.0`, so the output lies in `[-1.0, 1.0)`
/// with `-32768` hitting exactly `-1.0`. A trailing odd byte, which cannot
/// form a sample, is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_zero() {
        assert_eq!(decode_pcm16le(&[0x00, 0x00]), vec![0.0]);
    }

    #[test]
    fn test_decode_max_positive() {
        // 0x7FFF -> 32767 / 32768 ~= 0.99997
        let samples = decode_pcm16le(&[0xFF, 0x7F]);
        assert!((samples[0] - 32767.0 / 32768.0).abs() < f32::EPSILON);
        assert!(samples[0] < 1.0);
    }

    #[test]
    fn test_decode_min_negative() {
        // -32768 -> exactly -1.0
        assert_eq!(decode_pcm16le(&[0x00, 0x80]), vec![-1.0]);
    }

    #[test]
    fn test_decode_round_trip() {
        for s in [-32768i16, -12345, -1, 0, 1, 12345, 32767] {
            let bytes = s.to_le_bytes();
            let decoded = decode_pcm16le(&bytes)[0];
            assert!((decoded - s as f32 / 32768.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn test_decode_ignores_trailing_odd_byte() {
        let samples = decode_pcm16le(&[0x00, 0x00, 0xFF]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_pcm16le(&[]).is_empty());
    }
}
