//! Capture conditioning: reduce a looped recording to one MLS period.
//!
//! A recording of looped playback holds `C ≥ P` samples starting at an
//! arbitrary point in the sequence, possibly on a drifting clock and with a
//! settling transient at the start. Conditioning resamples onto the source
//! clock and, when asked to, aligns the analysis window to the start of a
//! period. It then skips the settling periods and averages every remaining
//! complete period, which lowers uncorrelated noise by `sqrt(periods)`.
//! A capture of exactly one period goes to the deconvolver as recorded.

use crate::error::{DspError, DspResult};
use crate::lag::{LagEstimate, LagEstimator};
use crate::resample::{are_compatible_rates, resample};
use lib_types::units::Hertz;

/// Capture conditioning options.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditioningConfig {
    /// Whole periods to discard before averaging. Never discards the last
    /// available period.
    pub skip_periods: usize,

    /// Align the analysis window using the lag estimator. Off by default,
    /// so the response keeps the system's propagation delay.
    pub align_lag: bool,

    /// Resample from the sink rate to the source rate when they differ.
    pub compensate_drift: bool,

    /// Remove the mean before lag estimation.
    pub remove_mean: bool,

    /// Samples kept ahead of the strongest arrival after alignment.
    pub pre_roll: usize,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            skip_periods: 1,
            align_lag: false,
            compensate_drift: true,
            remove_mean: true,
            pre_roll: 0,
        }
    }
}

/// One averaged period plus how it was obtained.
#[derive(Clone, Debug)]
pub struct ConditionedCapture {
    /// Exactly `P` samples.
    pub period: Vec<f64>,

    /// Start of the analysis window in the (resampled) capture.
    pub offset: usize,

    /// Number of periods averaged.
    pub periods_averaged: usize,

    /// Lag estimate, when alignment ran.
    pub lag: Option<LagEstimate>,

    /// Whether the capture was resampled.
    pub resampled: bool,
}

/// Reduces captures to a single period for one excitation.
#[derive(Debug)]
pub struct CaptureConditioner {
    config: ConditioningConfig,
    source_rate: Hertz,
    sink_rate: Hertz,
    estimator: LagEstimator,
}

impl CaptureConditioner {
    pub fn new(config: ConditioningConfig, source_rate: Hertz, sink_rate: Hertz) -> Self {
        let estimator = LagEstimator::new().with_mean_removal(config.remove_mean);
        Self {
            config,
            source_rate,
            sink_rate,
            estimator,
        }
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    /// Condition `captured` against one period of `excitation`.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if fewer than `P` samples remain after resampling.
    pub fn condition(&mut self, excitation: &[f64], captured: &[f64]) -> DspResult<ConditionedCapture> {
        let p = excitation.len();
        if p == 0 {
            return Err(DspError::InsufficientData { needed: 1, got: 0 });
        }
        if captured.len() < p {
            return Err(DspError::size_mismatch(p, captured.len()));
        }

        let rates_differ = !are_compatible_rates(self.source_rate, self.sink_rate, 1e-12);
        let resampled = rates_differ && self.config.compensate_drift;
        if rates_differ && !resampled {
            tracing::warn!(
                source_hz = self.source_rate.0,
                sink_hz = self.sink_rate.0,
                "sample rates differ but drift compensation is disabled"
            );
        }

        let owned;
        let signal: &[f64] = if resampled {
            owned = resample(captured, self.sink_rate, self.source_rate)?;
            if owned.len() < p {
                return Err(DspError::size_mismatch(p, owned.len()));
            }
            &owned
        } else {
            captured
        };

        if signal.len() == p {
            tracing::debug!(len = p, resampled, "single period capture, passed through");
            return Ok(ConditionedCapture {
                period: signal.to_vec(),
                offset: 0,
                periods_averaged: 1,
                lag: None,
                resampled,
            });
        }

        let lag = if self.config.align_lag {
            Some(self.estimator.estimate_periodic(excitation, signal)?)
        } else {
            None
        };
        let offset = lag.as_ref().map_or(0, |est| {
            (est.lag - self.config.pre_roll as isize).rem_euclid(p as isize) as usize
        });

        let available = (signal.len() - offset) / p;
        let (period, periods_averaged) = if available == 0 {
            // Less than one period after the offset: a steady-state period is
            // circular, so read it rotated.
            let mut period = signal[..p].to_vec();
            period.rotate_left(offset);
            (period, 1)
        } else {
            let skip = self.config.skip_periods.min(available - 1);
            if skip < self.config.skip_periods {
                tracing::debug!(
                    requested = self.config.skip_periods,
                    skip,
                    "not enough periods to skip, keeping the last one"
                );
            }
            let count = available - skip;
            let start = offset + skip * p;
            (average_periods(&signal[start..start + count * p], p), count)
        };

        tracing::debug!(
            len = captured.len(),
            offset,
            periods_averaged,
            resampled,
            "conditioned capture"
        );

        Ok(ConditionedCapture {
            period,
            offset,
            periods_averaged,
            lag,
            resampled,
        })
    }
}

/// Average consecutive length-`p` chunks of `signal` (length a multiple of `p`).
fn average_periods(signal: &[f64], p: usize) -> Vec<f64> {
    let count = signal.len() / p;
    let mut acc = vec![0.0; p];
    for chunk in signal.chunks_exact(p) {
        for (a, &v) in acc.iter_mut().zip(chunk) {
            *a += v;
        }
    }
    let scale = 1.0 / count.max(1) as f64;
    acc.iter_mut().for_each(|a| *a *= scale);
    acc
}
