//! Measurement session state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a measurement session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Buffers allocated, excitation not yet generated.
    Created,
    /// Excitation (and its tags) generated.
    Generated,
    /// Capture buffer handed out or filled.
    Captured,
    /// Impulse response computed for the current capture.
    Computed,
    /// Buffers dropped; the session is unusable.
    Released,
}

impl SessionState {
    /// Whether the session still owns its buffers.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Released)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Generated => "generated",
            Self::Captured => "captured",
            Self::Computed => "computed",
            Self::Released => "released",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display_and_serde() {
        assert_eq!(SessionState::Computed.to_string(), "computed");
        assert_eq!(
            serde_json::to_string(&SessionState::Released).unwrap(),
            "\"released\""
        );
        assert!(SessionState::Captured.is_live());
        assert!(!SessionState::Released.is_live());
    }
}
