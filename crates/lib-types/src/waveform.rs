//! Time-domain waveform representation.
//!
//! Waveforms carry captured recordings and measured impulse responses
//! together with their sample rate, so that tap indices can be reported as
//! times and durations.
//!
//! # Sample Semantics
//!
//! Samples are point measurements at uniform instants:
//!
//! ```text
//! t[i] = t_start + i * dt,  for i = 0, 1, ..., N-1
//! ```

use crate::units::{Hertz, Seconds};
use serde::{Deserialize, Serialize};

/// A uniformly-sampled time-domain waveform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Sample values (normalized full scale).
    pub samples: Vec<f64>,

    /// Time step between consecutive samples.
    pub dt: Seconds,

    /// Time of the first sample.
    pub t_start: Seconds,
}

impl Waveform {
    /// Create a waveform starting at t = 0 from samples taken at `rate`.
    pub fn from_rate(samples: Vec<f64>, rate: Hertz) -> Self {
        Self {
            samples,
            dt: rate.to_period(),
            t_start: Seconds::ZERO,
        }
    }

    /// Number of samples in the waveform.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the waveform is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the time value for a given sample index.
    #[inline]
    pub fn time_at(&self, index: usize) -> Seconds {
        Seconds(self.t_start.0 + index as f64 * self.dt.0)
    }

    /// Sample rate (reciprocal of dt).
    #[inline]
    pub fn sample_rate(&self) -> Hertz {
        self.dt.to_frequency()
    }

    /// Index of the sample with the largest magnitude.
    pub fn peak_index(&self) -> Option<usize> {
        self.samples
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.abs().total_cmp(&b.abs()))
            .map(|(i, _)| i)
    }

    /// Total energy (sum of squares).
    pub fn energy(&self) -> f64 {
        self.samples.iter().map(|v| v * v).sum()
    }

    /// Scale all samples by a factor.
    pub fn scale(&mut self, factor: f64) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Keep only the first `len` samples.
    pub fn truncate(&mut self, len: usize) {
        self.samples.truncate(len);
    }

    /// Energy decay curve in dB (Schroeder backward integration),
    /// normalized so the first value is 0 dB.
    pub fn energy_decay_db(&self) -> Vec<f64> {
        let mut remaining: Vec<f64> = Vec::with_capacity(self.samples.len());
        let mut acc = 0.0;
        for v in self.samples.iter().rev() {
            acc += v * v;
            remaining.push(acc);
        }
        remaining.reverse();

        let total = remaining.first().copied().unwrap_or(0.0);
        if total <= 0.0 {
            return vec![f64::NEG_INFINITY; self.samples.len()];
        }
        remaining
            .into_iter()
            .map(|e| 10.0 * (e / total).log10())
            .collect()
    }
}
