//! Error types for measurement sessions.

use lib_dsp::DspError;
use lib_types::session::SessionState;
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// Order outside the supported range.
    #[error("Invalid MLS order {0}")]
    InvalidOrder(u32),

    /// Buffer length disagrees with the order.
    #[error("Size mismatch: expected {expected} samples, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Excitation not generated and the policy forbids generating it.
    #[error("Excitation has not been generated")]
    NotGenerated,

    /// Operation on a released session.
    #[error("Session used after release")]
    UseAfterRelease,

    /// Operation not valid in the current state.
    #[error("Invalid session state: expected {expected:?}, got {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Any other DSP failure.
    #[error(transparent)]
    Dsp(DspError),
}

impl SessionError {
    /// Create an invalid state error.
    pub fn invalid_state(expected: SessionState, actual: SessionState) -> Self {
        Self::InvalidState { expected, actual }
    }
}

impl From<DspError> for SessionError {
    fn from(err: DspError) -> Self {
        match err {
            DspError::InvalidOrder(order) => Self::InvalidOrder(order),
            DspError::SizeMismatch { expected, actual } => Self::SizeMismatch { expected, actual },
            other => Self::Dsp(other),
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dsp_errors_are_lifted() {
        assert_eq!(
            SessionError::from(DspError::InvalidOrder(17)),
            SessionError::InvalidOrder(17)
        );
        assert_eq!(
            SessionError::from(DspError::size_mismatch(15, 14)),
            SessionError::SizeMismatch { expected: 15, actual: 14 }
        );
        assert!(matches!(
            SessionError::from(DspError::InvalidTransformSize(3)),
            SessionError::Dsp(DspError::InvalidTransformSize(3))
        ));
    }
}
