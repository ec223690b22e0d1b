//! Superclock: the canonical high-resolution tick clock
//!
//! The superclock is a fixed-frequency counter independent of sample rate
//! and tempo. Its frequency has every standard sample rate and every common
//! note divisor among its factors, so conversions to samples are exact for
//! all supported rates.

/// Superclock ticks. Signed so that durations and backward offsets use the
/// same type.
pub type Superclock = i64;

/// Superclock ticks per second: 508,032,000.
///
/// Factors: 2^10 * 3^4 * 5^3 * 7^2 — divisible by 44100, 48000, 88200,
/// 96000, 176400, 192000 and all common tuplet divisors.
pub const SUPERCLOCK_TICKS_PER_SECOND: Superclock = 508_032_000;

/// Convert superclock ticks to audio samples at the given rate.
#[inline]
pub fn superclock_to_samples(sc: Superclock, sample_rate: u32) -> i64 {
    let num = sc as i128 * sample_rate as i128;
    let den = SUPERCLOCK_TICKS_PER_SECOND as i128;
    // round to nearest, ties away from zero
    let half = if num >= 0 { den / 2 } else { -(den / 2) };
    ((num + half) / den) as i64
}

/// Convert audio samples at the given rate to superclock ticks.
///
/// Exact for every standard sample rate (the superclock frequency is an
/// integer multiple of each).
#[inline]
pub fn samples_to_superclock(samples: i64, sample_rate: u32) -> Superclock {
    let num = samples as i128 * SUPERCLOCK_TICKS_PER_SECOND as i128;
    let den = sample_rate as i128;
    let half = if num >= 0 { den / 2 } else { -(den / 2) };
    ((num + half) / den) as Superclock
}

/// Convert superclock ticks to seconds (presentation only).
#[inline]
pub fn superclock_to_seconds(sc: Superclock) -> f64 {
    sc as f64 / SUPERCLOCK_TICKS_PER_SECOND as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_conversion_exact_for_standard_rates() {
        for rate in [44100u32, 48000, 88200, 96000, 176400, 192000] {
            assert_eq!(
                SUPERCLOCK_TICKS_PER_SECOND % rate as i64,
                0,
                "superclock must be divisible by {}",
                rate
            );
            // one second
            assert_eq!(
                superclock_to_samples(SUPERCLOCK_TICKS_PER_SECOND, rate),
                rate as i64
            );
            assert_eq!(
                samples_to_superclock(rate as i64, rate),
                SUPERCLOCK_TICKS_PER_SECOND
            );
        }
    }

    #[test]
    fn test_round_trip() {
        let sr = 48000;
        for samples in [0i64, 1, 255, 48000, 1_234_567] {
            let sc = samples_to_superclock(samples, sr);
            assert_eq!(superclock_to_samples(sc, sr), samples);
        }
    }

    #[test]
    fn test_negative_offsets() {
        let sr = 48000;
        assert_eq!(superclock_to_samples(-SUPERCLOCK_TICKS_PER_SECOND, sr), -48000);
        assert_eq!(samples_to_superclock(-48000, sr), -SUPERCLOCK_TICKS_PER_SECOND);
    }
}
