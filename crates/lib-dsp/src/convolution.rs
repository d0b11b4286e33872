//! Circular convolution.
//!
//! A looped MLS reaches steady state after one period, after which every
//! recorded period is the circular convolution of the excitation with the
//! system's impulse response. These routines synthesize such captures for
//! simulation and tests; long kernels go through the FFT.

use crate::error::{DspError, DspResult};
use crate::fft::FftEngine;

/// Direct circular convolution, O(P·K).
///
/// Output length equals `signal.len()`; `y[i] = Σ_k kernel[k]·signal[(i - k) mod P]`.
/// Kernels longer than the signal wrap around.
pub fn circular_convolve(signal: &[f64], kernel: &[f64]) -> Vec<f64> {
    let p = signal.len();
    if p == 0 {
        return Vec::new();
    }

    let mut out = vec![0.0; p];
    for (k, &h) in kernel.iter().enumerate() {
        if h == 0.0 {
            continue;
        }
        let shift = k % p;
        for (i, o) in out.iter_mut().enumerate() {
            *o += h * signal[(i + p - shift) % p];
        }
    }
    out
}

/// FFT circular convolution; same result as [`circular_convolve`].
pub fn fft_circular_convolve(signal: &[f64], kernel: &[f64]) -> DspResult<Vec<f64>> {
    let p = signal.len();
    if p == 0 {
        return Err(DspError::InsufficientData { needed: 1, got: 0 });
    }

    let mut wrapped = vec![0.0; p];
    for (k, &h) in kernel.iter().enumerate() {
        wrapped[k % p] += h;
    }

    FftEngine::new().circular_convolve(signal, &wrapped)
}

/// Rotate `signal` right by `delay` samples.
pub fn circular_delay(signal: &[f64], delay: usize) -> Vec<f64> {
    let mut out = signal.to_vec();
    if !out.is_empty() {
        let shift = delay % out.len();
        out.rotate_right(shift);
    }
    out
}
