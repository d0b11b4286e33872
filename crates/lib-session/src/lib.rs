//! # lib-session
//!
//! Measurement sessions for MLS impulse-response capture.
//!
//! A session is the ownership contract between the compute core and
//! whatever plays and records audio: it hands out the excitation, a
//! writable capture buffer, and the resulting impulse response as borrows,
//! and tracks where in the measurement cycle it is.
//!
//! ```no_run
//! use lib_session::MlsSession;
//! use lib_types::units::Hertz;
//!
//! let mut session = MlsSession::create(16, Hertz::DAT, Hertz::DAT)?;
//! let excitation = session.excitation_signal()?.to_vec();
//! // ... play `excitation` in a loop and record 4 periods ...
//! let capture = session.allocate_capture_buffer(4 * excitation.len())?;
//! capture.fill(0.0);
//! let response = session.compute_impulse_response()?;
//! assert_eq!(response.len(), excitation.len() + 1);
//! # Ok::<(), lib_session::SessionError>(())
//! ```

pub mod error;
pub mod session;

pub use error::{SessionError, SessionResult};
pub use session::{ConditioningSummary, GenerationPolicy, MlsSession, SessionConfig};
