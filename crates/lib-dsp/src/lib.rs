//! # lib-dsp
//!
//! Compute core for MLS impulse-response measurement.
//!
//! This crate provides the signal processing pipeline:
//!
//! - **MLS Generation**: LFSR maximum length sequences of order 2..=16
//! - **Permutation Tags**: `TagL`/`TagS` mapping MLS correlation onto a Hadamard transform
//! - **Deconvolution**: Permuted fast Hadamard transform, O(P log P)
//! - **Lag Estimation**: FFT cross-correlation for alignment and clock drift
//! - **Capture Conditioning**: Drift resampling, alignment and period averaging
//! - **Excitation Shaping**: S-curve onset/release tapers for looped playback

pub mod cache;
pub mod capture;
pub mod convolution;
pub mod deconvolution;
pub mod error;
pub mod fft;
pub mod hadamard;
pub mod lag;
pub mod mls;
pub mod resample;
pub mod tags;
pub mod window;

pub use cache::{ArtifactCache, OrderArtifacts};
pub use capture::{CaptureConditioner, ConditionedCapture, ConditioningConfig};
pub use deconvolution::{Deconvolver, HadamardSpectrum, ImpulseResponse, PermutedSignal};
pub use error::{DspError, DspResult};
pub use fft::FftEngine;
pub use lag::{LagEstimate, LagEstimator, PeriodEstimate};
pub use mls::{MaximumLengthSequence, MlsOrder};
pub use tags::PermutationTags;
