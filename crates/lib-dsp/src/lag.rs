//! Lag and period estimation by FFT correlation.
//!
//! Playback and capture run on independent devices, so a recording starts at
//! an arbitrary offset into the looped excitation and may run on a slightly
//! different clock. The lag estimator finds the integer offset from a
//! circular cross-correlation against the excitation; the period estimator
//! finds the repetition period of a looped capture from its
//! autocorrelation, which measures the clock drift.

use crate::error::{DspError, DspResult};
use crate::fft::FftEngine;
use lib_types::units::Ppm;
use num_complex::Complex64;

/// Result of a lag estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct LagEstimate {
    /// Signed lag in samples; positive means the capture is delayed
    /// relative to the reference.
    pub lag: isize,

    /// Index of the peak in the re-centered correlation (zero lag at `C/2`).
    pub peak_index: usize,

    /// Correlation value at the peak (signed).
    pub peak_value: f64,

    /// Correlation values immediately left and right of the peak,
    /// wrapping circularly.
    pub neighbours: (f64, f64),
}

/// Result of a period estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodEstimate {
    /// Measured repetition period in capture samples.
    pub period: f64,

    /// `period / nominal`; above 1 when the capture clock runs fast.
    pub ratio: f64,

    /// Drift expressed in parts per million.
    pub drift: Ppm,
}

/// Correlation-based lag and period estimator.
#[derive(Debug)]
pub struct LagEstimator {
    engine: FftEngine,
    remove_mean: bool,
}

impl LagEstimator {
    /// Create an estimator that removes the mean of both inputs first.
    pub fn new() -> Self {
        Self {
            engine: FftEngine::new(),
            remove_mean: true,
        }
    }

    /// Enable or disable mean removal.
    pub fn with_mean_removal(mut self, remove_mean: bool) -> Self {
        self.remove_mean = remove_mean;
        self
    }

    /// Estimate the lag of `captured` relative to `reference`.
    ///
    /// Both buffers must have the same length `C`. The correlation is
    /// re-centered so zero lag sits at index `C/2`; the lag is the index of
    /// maximum magnitude minus `C/2`. A pure circular shift by `k` therefore
    /// reports `k` for `k < C/2` and `k - C` otherwise.
    pub fn estimate(&mut self, reference: &[f64], captured: &[f64]) -> DspResult<LagEstimate> {
        if reference.len() != captured.len() {
            return Err(DspError::size_mismatch(captured.len(), reference.len()));
        }
        if captured.len() < 2 {
            return Err(DspError::InsufficientData {
                needed: 2,
                got: captured.len(),
            });
        }

        let reference = self.prepare(reference);
        let captured = self.prepare(captured);
        let corr = self.engine.cross_correlate(&reference, &captured)?;

        let len = corr.len();
        let half = len / 2;
        let centered = |j: usize| corr[(j + len - half) % len];

        let peak_index = (0..len)
            .max_by(|&a, &b| centered(a).abs().total_cmp(&centered(b).abs()))
            .unwrap_or(half);

        let estimate = LagEstimate {
            lag: peak_index as isize - half as isize,
            peak_index,
            peak_value: centered(peak_index),
            neighbours: (
                centered((peak_index + len - 1) % len),
                centered((peak_index + 1) % len),
            ),
        };

        tracing::debug!(
            len,
            lag = estimate.lag,
            peak = estimate.peak_value,
            "estimated lag"
        );

        Ok(estimate)
    }

    /// Estimate the lag of a looped capture against one excitation period.
    pub fn estimate_periodic(&mut self, excitation: &[f64], captured: &[f64]) -> DspResult<LagEstimate> {
        let reference = Self::periodic_reference(excitation, captured.len());
        self.estimate(&reference, captured)
    }

    /// Tile `excitation` to `len` samples, matching looped playback.
    pub fn periodic_reference(excitation: &[f64], len: usize) -> Vec<f64> {
        if excitation.is_empty() {
            return vec![0.0; len];
        }
        excitation.iter().copied().cycle().take(len).collect()
    }

    /// Estimate the repetition period of a looped capture.
    ///
    /// Searches the linear autocorrelation (normalized by overlap length)
    /// for the peak within `nominal ± radius` and refines it with a parabola
    /// through the peak and its neighbours.
    pub fn estimate_period(
        &mut self,
        captured: &[f64],
        nominal: usize,
        radius: usize,
    ) -> DspResult<PeriodEstimate> {
        if nominal == 0 || radius >= nominal {
            return Err(DspError::InvalidConfig(format!(
                "period search {nominal} ± {radius} is empty or reaches lag 0"
            )));
        }
        let needed = nominal + radius + 2;
        if captured.len() < needed {
            return Err(DspError::InsufficientData {
                needed,
                got: captured.len(),
            });
        }

        let acf = self.autocorrelation(captured)?;
        let len = captured.len();
        let normalized = |lag: usize| acf[lag] / (len - lag) as f64;

        let lo = nominal - radius;
        let hi = nominal + radius;
        let peak = (lo..=hi)
            .max_by(|&a, &b| normalized(a).total_cmp(&normalized(b)))
            .unwrap_or(nominal);

        let (l, c, r) = (normalized(peak - 1), normalized(peak), normalized(peak + 1));
        let curvature = l - 2.0 * c + r;
        let offset = if curvature.abs() > f64::EPSILON {
            (0.5 * (l - r) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let period = peak as f64 + offset;
        let ratio = period / nominal as f64;
        let estimate = PeriodEstimate {
            period,
            ratio,
            drift: Ppm::from_ratio(ratio),
        };

        if peak == lo || peak == hi {
            tracing::warn!(peak, nominal, radius, "period peak at search boundary");
        }
        tracing::debug!(period, ppm = estimate.drift.0, "estimated period");

        Ok(estimate)
    }

    /// Linear autocorrelation for lags `0..len` via a zero-padded FFT.
    fn autocorrelation(&mut self, signal: &[f64]) -> DspResult<Vec<f64>> {
        let len = signal.len();
        let mut padded = self.prepare(signal);
        padded.resize(2 * len, 0.0);

        let spectrum = self.engine.rfft(&padded)?;
        let power: Vec<Complex64> = spectrum
            .iter()
            .map(|c| Complex64::new(c.norm_sqr(), 0.0))
            .collect();
        let mut acf = self.engine.irfft(&power, 2 * len)?;
        acf.truncate(len);
        Ok(acf)
    }

    fn prepare(&self, signal: &[f64]) -> Vec<f64> {
        if !self.remove_mean {
            return signal.to_vec();
        }
        let mean = signal.iter().sum::<f64>() / signal.len().max(1) as f64;
        signal.iter().map(|v| v - mean).collect()
    }
}

impl Default for LagEstimator {
    fn default() -> Self {
        Self::new()
    }
}
