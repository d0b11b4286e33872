//! # lib-types
//!
//! Core type definitions shared across the measurement workspace:
//! - Physical units (sample rates, durations, clock drift)
//! - Waveform representation for captured signals and impulse responses
//! - Measurement session state

pub mod session;
pub mod units;
pub mod waveform;

pub use session::*;
pub use units::*;
pub use waveform::*;
