// Volume - instantaneous signal level of one audio frame
//
// Volume is the root-mean-square of the frame with every sample normalized
// to [-1, 1] first. Float input is clamped to that range; 16-bit PCM is
// scaled by its full-scale value.

/// RMS of a frame of normalized samples, `0.0` for an empty frame
pub fn rms(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = frame
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0) as f64;
            s * s
        })
        .sum();
    (sum_squares / frame.len() as f64).sqrt()
}

/// Normalize a signed 16-bit PCM sample to [-1, 1]
pub fn normalize_i16(sample: i16) -> f32 {
    (sample as f32 / i16::MAX as f32).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_silence_is_zero() {
        assert_eq!(rms(&[0.0; 256]), 0.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        assert!((rms(&[0.5; 128]) - 0.5).abs() < 1e-9);
        assert!((rms(&[-0.25; 64]) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_rms_of_square_wave() {
        let frame: Vec<f32> = (0..512)
            .map(|i| if i % 2 == 0 { 0.8 } else { -0.8 })
            .collect();
        assert!((rms(&frame) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rms_clamps_out_of_range_samples() {
        assert!((rms(&[4.0, -4.0]) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_integer_normalization() {
        assert_eq!(normalize_i16(0), 0.0);
        assert_eq!(normalize_i16(i16::MAX), 1.0);
        assert_eq!(normalize_i16(i16::MIN), -1.0);
    }
}
