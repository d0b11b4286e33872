//! FFT/IFFT operations using rustfft and realfft.
//!
//! This module provides a thin wrapper around the planners with:
//! - Planner caching for repeated transforms of the same length
//! - Real-to-complex and complex-to-real transforms
//! - Circular cross-correlation and convolution
//!
//! Capture lengths are arbitrary (an MLS period is `2^N - 1`), so unlike a
//! radix-2 engine any non-zero length is accepted.

use crate::error::{DspError, DspResult};
use num_complex::Complex64;
use realfft::RealFftPlanner;
use rustfft::FftPlanner;

/// FFT engine with cached planners.
pub struct FftEngine {
    /// Complex FFT planner.
    complex_planner: FftPlanner<f64>,

    /// Real FFT planner.
    real_planner: RealFftPlanner<f64>,
}

impl FftEngine {
    /// Create a new FFT engine.
    pub fn new() -> Self {
        Self {
            complex_planner: FftPlanner::new(),
            real_planner: RealFftPlanner::new(),
        }
    }

    /// Forward FFT on complex data in place.
    pub fn fft_inplace(&mut self, data: &mut [Complex64]) -> DspResult<()> {
        check_len(data.len())?;
        let fft = self.complex_planner.plan_fft_forward(data.len());
        fft.process(data);
        Ok(())
    }

    /// Inverse FFT on complex data in place, normalized by `1 / len`.
    pub fn ifft_inplace(&mut self, data: &mut [Complex64]) -> DspResult<()> {
        let len = data.len();
        check_len(len)?;

        let fft = self.complex_planner.plan_fft_inverse(len);
        fft.process(data);

        let scale = 1.0 / len as f64;
        for x in data.iter_mut() {
            *x *= scale;
        }
        Ok(())
    }

    /// Forward real-to-complex FFT.
    ///
    /// Input: N real samples
    /// Output: N/2 + 1 complex bins
    pub fn rfft(&mut self, data: &[f64]) -> DspResult<Vec<Complex64>> {
        check_len(data.len())?;

        let r2c = self.real_planner.plan_fft_forward(data.len());
        let mut input = data.to_vec();
        let mut output = r2c.make_output_vec();

        r2c.process(&mut input, &mut output)
            .map_err(|e| DspError::NumericalInstability(e.to_string()))?;

        Ok(output)
    }

    /// Inverse complex-to-real FFT, normalized by `1 / output_len`.
    ///
    /// The imaginary parts of the DC bin (and the Nyquist bin for even
    /// lengths) are discarded, as a real signal cannot carry them.
    pub fn irfft(&mut self, data: &[Complex64], output_len: usize) -> DspResult<Vec<f64>> {
        check_len(output_len)?;

        let expected = output_len / 2 + 1;
        if data.len() != expected {
            return Err(DspError::size_mismatch(expected, data.len()));
        }

        let c2r = self.real_planner.plan_fft_inverse(output_len);
        let mut input = data.to_vec();
        input[0].im = 0.0;
        if output_len % 2 == 0 {
            input[expected - 1].im = 0.0;
        }
        let mut output = c2r.make_output_vec();

        c2r.process(&mut input, &mut output)
            .map_err(|e| DspError::NumericalInstability(e.to_string()))?;

        let scale = 1.0 / output_len as f64;
        for x in output.iter_mut() {
            *x *= scale;
        }

        Ok(output)
    }

    /// Circular cross-correlation of `signal` against `reference`.
    ///
    /// Element `k` is `Σ_n signal[n]·reference[(n - k) mod C]`, so a signal
    /// that is the reference delayed by `d` peaks at `k = d`. Computed as
    /// `IFFT(FFT(signal) · conj(FFT(reference)))`.
    pub fn cross_correlate(&mut self, reference: &[f64], signal: &[f64]) -> DspResult<Vec<f64>> {
        if reference.len() != signal.len() {
            return Err(DspError::size_mismatch(signal.len(), reference.len()));
        }

        let r = self.rfft(reference)?;
        let x = self.rfft(signal)?;
        let product: Vec<Complex64> = x.iter().zip(&r).map(|(x, r)| x * r.conj()).collect();

        self.irfft(&product, signal.len())
    }

    /// Circular convolution of two equal-length real signals.
    pub fn circular_convolve(&mut self, a: &[f64], b: &[f64]) -> DspResult<Vec<f64>> {
        if a.len() != b.len() {
            return Err(DspError::size_mismatch(a.len(), b.len()));
        }

        let mut fa = to_complex(a);
        let mut fb = to_complex(b);
        self.fft_inplace(&mut fa)?;
        self.fft_inplace(&mut fb)?;

        for (x, y) in fa.iter_mut().zip(&fb) {
            *x *= y;
        }
        self.ifft_inplace(&mut fa)?;

        Ok(fa.into_iter().map(|c| c.re).collect())
    }
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftEngine").finish_non_exhaustive()
    }
}

#[inline]
fn check_len(len: usize) -> DspResult<()> {
    if len == 0 {
        return Err(DspError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(())
}

fn to_complex(signal: &[f64]) -> Vec<Complex64> {
    signal.iter().map(|&v| Complex64::new(v, 0.0)).collect()
}
