//! Onset and release tapers for looped excitation playback.
//!
//! Starting or stopping a full-scale MLS abruptly produces a click that
//! excites the loudspeaker well outside the measured band. The playback
//! buffer is therefore faded in and out with raised-sine S-curves.

use crate::error::{DspError, DspResult};
use std::f64::consts::{FRAC_PI_2, PI};

/// Default playback amplitude relative to full scale.
pub const DEFAULT_AMPLITUDE: f64 = 0.5;

/// Raised-sine S-curve: `curve[i] = sin(π·i/len - phase)/2 + 0.5`.
///
/// With `phase = π/2` this rises from 0 towards 1.
pub fn s_curve(len: usize, phase: f64) -> Vec<f64> {
    (0..len)
        .map(|i| (PI * i as f64 / len as f64 - phase).sin() / 2.0 + 0.5)
        .collect()
}

/// The S-curve evaluated back to front.
pub fn inverse_s_curve(len: usize, phase: f64) -> Vec<f64> {
    let mut curve = s_curve(len, phase);
    curve.reverse();
    curve
}

/// Fade-in ramp from 0 towards 1.
pub fn onset_ramp(len: usize) -> Vec<f64> {
    s_curve(len, FRAC_PI_2)
}

/// Fade-out ramp from 1 towards 0.
pub fn release_ramp(len: usize) -> Vec<f64> {
    inverse_s_curve(len, FRAC_PI_2)
}

/// Multiply the head of `signal` by the onset ramp and its tail by the
/// release ramp.
pub fn apply_tapers(signal: &mut [f64], taper_len: usize) -> DspResult<()> {
    if 2 * taper_len > signal.len() {
        return Err(DspError::InsufficientData {
            needed: 2 * taper_len,
            got: signal.len(),
        });
    }

    let tail_start = signal.len() - taper_len;
    for (s, g) in signal.iter_mut().zip(onset_ramp(taper_len)) {
        *s *= g;
    }
    for (s, g) in signal[tail_start..].iter_mut().zip(release_ramp(taper_len)) {
        *s *= g;
    }
    Ok(())
}

/// Build a looped playback buffer.
///
/// The excitation is repeated `periods` times, scaled by `amplitude`, and
/// tapered over `taper_len` samples at both ends.
///
/// # Arguments
///
/// * `excitation` - One period of the ±1 excitation
/// * `periods` - Number of repetitions
/// * `amplitude` - Scale factor, at most 1.0
/// * `taper_len` - Fade length in samples (0 disables the tapers)
pub fn playback_buffer(
    excitation: &[f64],
    periods: usize,
    amplitude: f64,
    taper_len: usize,
) -> DspResult<Vec<f64>> {
    if periods == 0 || excitation.is_empty() {
        return Err(DspError::InsufficientData {
            needed: 1,
            got: periods.min(excitation.len()),
        });
    }
    if !(amplitude > 0.0 && amplitude <= 1.0) {
        return Err(DspError::InvalidConfig(format!(
            "amplitude must be in (0, 1], got {amplitude}"
        )));
    }

    let mut buffer: Vec<f64> = excitation
        .iter()
        .cycle()
        .take(excitation.len() * periods)
        .map(|v| v * amplitude)
        .collect();
    apply_tapers(&mut buffer, taper_len)?;

    tracing::debug!(
        periods,
        amplitude,
        taper_len,
        len = buffer.len(),
        "built playback buffer"
    );

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_onset_ramp_shape() {
        let ramp = onset_ramp(100);

        assert_eq!(ramp.len(), 100);
        assert!(ramp[0].abs() < 1e-12);
        assert!((ramp[50] - 0.5).abs() < 1e-12);
        assert!(ramp[99] > 0.99);
        assert!(ramp.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_release_is_reversed_onset() {
        let onset = onset_ramp(16);
        let release = release_ramp(16);
        for (a, b) in onset.iter().zip(release.iter().rev()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_playback_buffer() {
        let excitation = [1.0, -1.0, -1.0];
        let buffer = playback_buffer(&excitation, 4, 0.5, 0).unwrap();

        assert_eq!(buffer.len(), 12);
        assert_eq!(&buffer[3..6], &[0.5, -0.5, -0.5]);

        let tapered = playback_buffer(&excitation, 4, 0.5, 3).unwrap();
        assert_eq!(tapered[0], 0.0);
        assert_eq!(&tapered[3..9], &buffer[3..9]);
        assert!(tapered[11].abs() < buffer[11].abs());
    }

    #[test]
    fn test_playback_buffer_rejects_bad_input() {
        assert!(playback_buffer(&[1.0], 0, 0.5, 0).is_err());
        assert!(playback_buffer(&[1.0], 2, 1.5, 0).is_err());
        assert!(matches!(
            playback_buffer(&[1.0, -1.0], 1, 0.5, 2),
            Err(DspError::InsufficientData { needed: 4, got: 2 })
        ));
    }
}
