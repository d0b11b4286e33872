//! Physical units with type safety.
//!
//! These newtypes keep sample rates and durations from being mixed up with
//! plain sample counts when converting between the source (playback) and
//! sink (capture) clock domains.

use serde::{Deserialize, Serialize};

/// Time duration in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_ms(ms: f64) -> Self {
        Self(ms * 1e-3)
    }

    #[inline]
    pub fn as_ms(&self) -> f64 {
        self.0 * 1e3
    }

    /// Convert to frequency (reciprocal).
    #[inline]
    pub fn to_frequency(&self) -> Hertz {
        Hertz(1.0 / self.0)
    }

    /// Number of whole samples this duration spans at `rate`.
    #[inline]
    pub fn to_samples(&self, rate: Hertz) -> usize {
        (self.0 * rate.0).round().max(0.0) as usize
    }
}

/// Frequency in Hertz. Used for both tone frequencies and sample rates.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Hertz(pub f64);

impl Hertz {
    /// 44.1 kHz consumer audio rate.
    pub const CD: Self = Self(44_100.0);

    /// 48 kHz professional audio rate.
    pub const DAT: Self = Self(48_000.0);

    /// Convert to period (reciprocal).
    #[inline]
    pub fn to_period(&self) -> Seconds {
        Seconds(1.0 / self.0)
    }

    /// Ratio `self / other`, e.g. sink rate over source rate.
    #[inline]
    pub fn ratio_to(&self, other: Hertz) -> f64 {
        self.0 / other.0
    }

    /// Whether this is a usable sample rate (finite and positive).
    #[inline]
    pub fn is_valid_rate(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }
}

/// Relative clock error in parts per million.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Ppm(pub f64);

impl Ppm {
    /// Drift implied by a rate ratio (1.0 means no drift).
    #[inline]
    pub fn from_ratio(ratio: f64) -> Self {
        Self((ratio - 1.0) * 1e6)
    }
}
