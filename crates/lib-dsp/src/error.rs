//! Error types for DSP operations.

use thiserror::Error;

/// Errors that can occur during DSP operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DspError {
    /// MLS order outside the supported tap table.
    #[error("MLS order must be in {min}..={max}, got {0}", min = crate::mls::MIN_ORDER, max = crate::mls::MAX_ORDER)]
    InvalidOrder(u32),

    /// Buffer length does not match the order-derived length.
    #[error("Size mismatch: expected {expected} samples, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Transform size is not a power of 2.
    #[error("Transform size must be a power of 2, got {0}")]
    InvalidTransformSize(usize),

    /// Insufficient data for operation.
    #[error("Insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// A tag table is not a permutation.
    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),
}

impl DspError {
    /// Create a size mismatch error.
    pub fn size_mismatch(expected: usize, actual: usize) -> Self {
        Self::SizeMismatch { expected, actual }
    }
}

/// Result type for DSP operations.
pub type DspResult<T> = Result<T, DspError>;
