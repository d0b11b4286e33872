//! MLS measurement session lifecycle.
//!
//! A session owns every buffer of one measurement at a fixed order:
//! the excitation (`P`), the capture (`C ≥ P`), the permutation scratch
//! (`P + 1`) and the impulse response (`P + 1`). Callers only ever see
//! borrows of them, so a view cannot outlive the session or survive
//! [`MlsSession::release`].
//!
//! The state machine is
//!
//! ```text
//! Created ──excitation_signal──▶ Generated ──capture_buffer──▶ Captured
//!                                                               │
//!                         ◀──capture_buffer── Computed ◀──compute_impulse_response
//! any ──release──▶ Released
//! ```
//!
//! Order artifacts (MLS and tags) are immutable and may be shared between
//! sessions on different threads; everything else is per session.

use crate::error::{SessionError, SessionResult};
use lib_dsp::{CaptureConditioner, ConditioningConfig, MlsOrder, OrderArtifacts};
use lib_types::session::SessionState;
use lib_types::units::Hertz;
use lib_types::waveform::Waveform;
use std::sync::Arc;
use std::time::Instant;

/// When the excitation may be generated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GenerationPolicy {
    /// Generate the MLS and tags on first need.
    #[default]
    OnDemand,

    /// Require an explicit `excitation_signal()` call before computing.
    Strict,
}

/// Session behaviour.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub policy: GenerationPolicy,
    pub conditioning: ConditioningConfig,
}

/// How the last capture was reduced to one period.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditioningSummary {
    pub offset: usize,
    pub periods_averaged: usize,
    pub lag: Option<isize>,
    pub resampled: bool,
}

/// An MLS impulse-response measurement session.
#[derive(Debug)]
pub struct MlsSession {
    order: MlsOrder,
    source_rate: Hertz,
    sink_rate: Hertz,
    config: SessionConfig,
    state: SessionState,

    /// Present once the excitation has been generated.
    artifacts: Option<Arc<OrderArtifacts>>,

    excitation: Vec<f64>,
    capture: Vec<f64>,
    scratch: Vec<f64>,
    response: Vec<f64>,

    conditioner: CaptureConditioner,
    last_conditioning: Option<ConditioningSummary>,
}

impl MlsSession {
    /// Create a session for order `order` with default configuration.
    ///
    /// # Arguments
    ///
    /// * `order` - MLS order `N`, 2..=16
    /// * `source_rate` - Playback device sample rate
    /// * `sink_rate` - Capture device sample rate
    pub fn create(order: u32, source_rate: Hertz, sink_rate: Hertz) -> SessionResult<Self> {
        Self::with_config(order, source_rate, sink_rate, SessionConfig::default())
    }

    /// Create a session with explicit configuration.
    pub fn with_config(
        order: u32,
        source_rate: Hertz,
        sink_rate: Hertz,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let order = MlsOrder::new(order)?;
        for rate in [source_rate, sink_rate] {
            if !rate.is_valid_rate() {
                return Err(lib_dsp::DspError::InvalidConfig(format!(
                    "sample rate must be positive, got {} Hz",
                    rate.0
                ))
                .into());
            }
        }

        let p = order.sequence_len();
        let conditioner =
            CaptureConditioner::new(config.conditioning.clone(), source_rate, sink_rate);

        tracing::info!(
            order = order.get(),
            len = p,
            source_hz = source_rate.0,
            sink_hz = sink_rate.0,
            "created MLS session"
        );

        Ok(Self {
            order,
            source_rate,
            sink_rate,
            config,
            state: SessionState::Created,
            artifacts: None,
            excitation: vec![0.0; p],
            capture: vec![0.0; p],
            scratch: vec![0.0; p + 1],
            response: vec![0.0; p + 1],
            conditioner,
            last_conditioning: None,
        })
    }

    /// Create a session around prebuilt (typically cached) artifacts.
    ///
    /// The session starts in `Generated`.
    pub fn with_artifacts(
        artifacts: Arc<OrderArtifacts>,
        source_rate: Hertz,
        sink_rate: Hertz,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        let mut session = Self::with_config(artifacts.order().get(), source_rate, sink_rate, config)?;
        session.install(artifacts);
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn order(&self) -> MlsOrder {
        self.order
    }

    /// Sequence length `P`.
    pub fn sequence_len(&self) -> usize {
        self.order.sequence_len()
    }

    pub fn source_rate(&self) -> Hertz {
        self.source_rate
    }

    pub fn sink_rate(&self) -> Hertz {
        self.sink_rate
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The excitation, generating it on first call.
    ///
    /// Repeated calls return bit-identical data.
    pub fn excitation_signal(&mut self) -> SessionResult<&[f64]> {
        self.ensure_live()?;
        if self.artifacts.is_none() {
            let start = Instant::now();
            let artifacts = Arc::new(OrderArtifacts::build(self.order));
            tracing::debug!(
                order = self.order.get(),
                elapsed_us = start.elapsed().as_micros() as u64,
                "generated excitation and tags"
            );
            self.install(artifacts);
        }
        Ok(&self.excitation)
    }

    /// The shared artifacts, if generated.
    pub fn artifacts(&self) -> Option<&Arc<OrderArtifacts>> {
        self.artifacts.as_ref()
    }

    /// Reallocate a zeroed capture buffer of `len` samples and return it.
    ///
    /// # Errors
    ///
    /// `SizeMismatch` if `len < P`.
    pub fn allocate_capture_buffer(&mut self, len: usize) -> SessionResult<&mut [f64]> {
        self.ensure_live()?;
        let p = self.sequence_len();
        if len < p {
            return Err(SessionError::SizeMismatch {
                expected: p,
                actual: len,
            });
        }

        self.capture.clear();
        self.capture.resize(len, 0.0);
        self.state = SessionState::Captured;

        tracing::debug!(len, periods = len / p, "allocated capture buffer");
        Ok(&mut self.capture)
    }

    /// The current capture buffer for writing, without reallocating.
    pub fn capture_buffer(&mut self) -> SessionResult<&mut [f64]> {
        self.ensure_live()?;
        self.state = SessionState::Captured;
        Ok(&mut self.capture)
    }

    /// Read-only view of the current capture.
    pub fn capture(&self) -> SessionResult<&[f64]> {
        self.ensure_live()?;
        Ok(&self.capture)
    }

    /// Copy `samples` into a capture buffer of matching length.
    pub fn load_capture(&mut self, samples: &[f64]) -> SessionResult<()> {
        self.allocate_capture_buffer(samples.len())?
            .copy_from_slice(samples);
        Ok(())
    }

    /// Condition the capture and deconvolve it.
    ///
    /// Returns `P + 1` values; the last is always 0.
    ///
    /// # Errors
    ///
    /// `NotGenerated` under [`GenerationPolicy::Strict`] when the excitation
    /// was never requested, `UseAfterRelease` after release.
    pub fn compute_impulse_response(&mut self) -> SessionResult<&[f64]> {
        self.ensure_live()?;

        let artifacts = match (&self.artifacts, self.config.policy) {
            (Some(artifacts), _) => Arc::clone(artifacts),
            (None, GenerationPolicy::Strict) => return Err(SessionError::NotGenerated),
            (None, GenerationPolicy::OnDemand) => {
                self.excitation_signal()?;
                self.artifacts
                    .as_ref()
                    .map(Arc::clone)
                    .ok_or(SessionError::NotGenerated)?
            }
        };

        let start = Instant::now();
        let conditioned = self.conditioner.condition(&artifacts.excitation, &self.capture)?;

        let p = self.sequence_len();
        let scratch = std::mem::take(&mut self.scratch);
        let response = std::mem::take(&mut self.response);
        match artifacts
            .deconvolver()
            .deconvolve_with(&conditioned.period, scratch, response)
        {
            Ok(ir) => {
                let (response, scratch) = ir.into_buffers();
                self.response = response;
                self.scratch = scratch;
            }
            Err(e) => {
                self.scratch = vec![0.0; p + 1];
                self.response = vec![0.0; p + 1];
                return Err(e.into());
            }
        }

        self.last_conditioning = Some(ConditioningSummary {
            offset: conditioned.offset,
            periods_averaged: conditioned.periods_averaged,
            lag: conditioned.lag.as_ref().map(|l| l.lag),
            resampled: conditioned.resampled,
        });
        self.state = SessionState::Computed;

        tracing::info!(
            order = self.order.get(),
            periods = conditioned.periods_averaged,
            offset = conditioned.offset,
            elapsed_ms = start.elapsed().as_secs_f64() * 1e3,
            "computed impulse response"
        );

        Ok(&self.response)
    }

    /// The last computed response (`P + 1` values).
    pub fn impulse_response(&self) -> SessionResult<&[f64]> {
        self.ensure_live()?;
        if self.state != SessionState::Computed {
            return Err(SessionError::invalid_state(SessionState::Computed, self.state));
        }
        Ok(&self.response)
    }

    /// The last computed response's `P` taps as a waveform at the source rate.
    pub fn impulse_waveform(&self) -> SessionResult<Waveform> {
        let response = self.impulse_response()?;
        Ok(Waveform::from_rate(
            response[..response.len() - 1].to_vec(),
            self.source_rate,
        ))
    }

    /// How the last capture was conditioned.
    pub fn last_conditioning(&self) -> Option<&ConditioningSummary> {
        self.last_conditioning.as_ref()
    }

    /// Drop all buffers. Every later operation fails with `UseAfterRelease`.
    ///
    /// Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.state == SessionState::Released {
            return;
        }

        self.artifacts = None;
        self.excitation = Vec::new();
        self.capture = Vec::new();
        self.scratch = Vec::new();
        self.response = Vec::new();
        self.last_conditioning = None;
        self.state = SessionState::Released;

        tracing::debug!(order = self.order.get(), "released MLS session");
    }

    fn install(&mut self, artifacts: Arc<OrderArtifacts>) {
        self.excitation.copy_from_slice(&artifacts.excitation);
        self.artifacts = Some(artifacts);
        if self.state == SessionState::Created {
            self.state = SessionState::Generated;
        }
    }

    fn ensure_live(&self) -> SessionResult<()> {
        if self.state.is_live() {
            Ok(())
        } else {
            Err(SessionError::UseAfterRelease)
        }
    }
}

impl Drop for MlsSession {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lib_dsp::convolution::{circular_convolve, circular_delay};
    use lib_dsp::ArtifactCache;

    const FILTER: [f64; 5] = [2.0, 0.4, 0.2, -0.1, -0.8];

    fn session(order: u32) -> MlsSession {
        MlsSession::create(order, Hertz::DAT, Hertz::DAT).unwrap()
    }

    #[test]
    fn test_invalid_orders() {
        for order in [0, 1, 17] {
            assert_eq!(
                MlsSession::create(order, Hertz::DAT, Hertz::DAT).unwrap_err(),
                SessionError::InvalidOrder(order)
            );
        }
    }

    #[test]
    fn test_excitation_is_idempotent() {
        let mut s = session(10);
        assert_eq!(s.state(), SessionState::Created);

        let first = s.excitation_signal().unwrap().to_vec();
        let second = s.excitation_signal().unwrap().to_vec();

        assert_eq!(first.len(), 1023);
        assert_eq!(first, second);
        assert!(first.iter().all(|&v| v == 1.0 || v == -1.0));
        assert_eq!(s.state(), SessionState::Generated);
    }

    #[test]
    fn test_single_period_round_trip() {
        let mut s = session(4);
        let excitation = s.excitation_signal().unwrap().to_vec();
        let captured = circular_convolve(&excitation, &FILTER);

        s.capture_buffer().unwrap().copy_from_slice(&captured);
        let resp = s.compute_impulse_response().unwrap();

        assert_eq!(resp.len(), 16);
        for (i, &h) in FILTER.iter().enumerate() {
            assert!((resp[i] - h).abs() < 1e-6);
        }
        assert!(resp[5..15].iter().all(|v| v.abs() < 1e-6));
        assert_eq!(resp[15], 0.0);
        assert_eq!(s.state(), SessionState::Computed);
    }

    #[test]
    fn test_leading_tap_stays_at_time_zero() {
        let h = [0.2, 1.0, 0.3];
        let mut s = session(4);
        let excitation = s.excitation_signal().unwrap().to_vec();
        let captured = circular_convolve(&excitation, &h);

        s.capture_buffer().unwrap().copy_from_slice(&captured);
        let resp = s.compute_impulse_response().unwrap().to_vec();

        for (i, &tap) in h.iter().enumerate() {
            assert!((resp[i] - tap).abs() < 1e-9, "tap {i}");
        }
        assert!(resp[3..].iter().all(|v| v.abs() < 1e-9));
        assert_eq!(s.last_conditioning().unwrap().offset, 0);
    }

    #[test]
    fn test_propagation_delay_is_kept() {
        let h = [0.0, 0.0, 0.0, 1.0, 0.5];
        let mut s = session(8);
        let excitation = s.excitation_signal().unwrap().to_vec();
        let one = circular_convolve(&excitation, &h);
        let looped: Vec<f64> = one.iter().copied().cycle().take(3 * one.len()).collect();

        s.allocate_capture_buffer(looped.len())
            .unwrap()
            .copy_from_slice(&looped);
        let resp = s.compute_impulse_response().unwrap().to_vec();

        assert!(resp[..3].iter().all(|v| v.abs() < 1e-9));
        assert!((resp[3] - 1.0).abs() < 1e-9);
        assert!((resp[4] - 0.5).abs() < 1e-9);

        let summary = s.last_conditioning().unwrap();
        assert_eq!(summary.offset, 0);
        assert_eq!(summary.lag, None);
        assert_eq!(summary.periods_averaged, 2);
    }

    #[test]
    fn test_averaged_shifted_capture_recovers_filter() {
        let config = SessionConfig {
            conditioning: ConditioningConfig {
                align_lag: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut s = MlsSession::with_config(9, Hertz::DAT, Hertz::DAT, config).unwrap();
        let excitation = s.excitation_signal().unwrap().to_vec();
        let p = excitation.len();

        // Four looped periods, recorded 123 samples late, with a short tail.
        let one = circular_convolve(&excitation, &FILTER);
        let looped: Vec<f64> = one.iter().copied().cycle().take(4 * p).collect();
        let mut captured = circular_delay(&looped, 123);
        captured.truncate(4 * p - 17);

        s.allocate_capture_buffer(captured.len())
            .unwrap()
            .copy_from_slice(&captured);
        let resp = s.compute_impulse_response().unwrap().to_vec();

        for (i, &h) in FILTER.iter().enumerate() {
            assert!((resp[i] - h).abs() < 1e-9, "tap {i}");
        }

        let summary = s.last_conditioning().unwrap();
        assert_eq!(summary.offset, 123);
        assert_eq!(summary.periods_averaged, 2);
    }

    #[test]
    fn test_short_capture_buffer_rejected() {
        let mut s = session(4);
        assert_eq!(
            s.allocate_capture_buffer(14).unwrap_err(),
            SessionError::SizeMismatch { expected: 15, actual: 14 }
        );
        assert!(s.load_capture(&[0.0; 14]).is_err());
    }

    #[test]
    fn test_strict_policy_requires_generation() {
        let config = SessionConfig {
            policy: GenerationPolicy::Strict,
            ..Default::default()
        };
        let mut s = MlsSession::with_config(5, Hertz::DAT, Hertz::DAT, config).unwrap();

        assert_eq!(s.compute_impulse_response().unwrap_err(), SessionError::NotGenerated);

        s.excitation_signal().unwrap();
        assert!(s.compute_impulse_response().is_ok());
    }

    #[test]
    fn test_on_demand_generates_when_computing() {
        let mut s = session(5);
        assert!(s.compute_impulse_response().is_ok());
        assert!(s.artifacts().is_some());
    }

    #[test]
    fn test_use_after_release() {
        let mut s = session(6);
        s.excitation_signal().unwrap();
        s.release();

        assert_eq!(s.state(), SessionState::Released);
        assert_eq!(s.excitation_signal().unwrap_err(), SessionError::UseAfterRelease);
        assert_eq!(s.capture_buffer().unwrap_err(), SessionError::UseAfterRelease);
        assert_eq!(s.capture().unwrap_err(), SessionError::UseAfterRelease);
        assert_eq!(
            s.compute_impulse_response().unwrap_err(),
            SessionError::UseAfterRelease
        );
        assert_eq!(
            s.allocate_capture_buffer(100).unwrap_err(),
            SessionError::UseAfterRelease
        );

        s.release();
        assert_eq!(s.state(), SessionState::Released);
    }

    #[test]
    fn test_response_requires_computation() {
        let mut s = session(4);
        s.excitation_signal().unwrap();
        assert_eq!(
            s.impulse_response().unwrap_err(),
            SessionError::invalid_state(SessionState::Computed, SessionState::Generated)
        );
    }

    #[test]
    fn test_sessions_share_cached_artifacts() {
        let cache = ArtifactCache::new();
        let artifacts = cache.get(8).unwrap();

        let a = MlsSession::with_artifacts(
            Arc::clone(&artifacts),
            Hertz::DAT,
            Hertz::DAT,
            SessionConfig::default(),
        )
        .unwrap();
        let b = MlsSession::with_artifacts(artifacts, Hertz::DAT, Hertz::DAT, SessionConfig::default())
            .unwrap();

        assert_eq!(a.state(), SessionState::Generated);
        assert!(Arc::ptr_eq(a.artifacts().unwrap(), b.artifacts().unwrap()));
    }

    #[test]
    fn test_impulse_waveform_uses_source_rate() {
        let mut s = MlsSession::create(4, Hertz::DAT, Hertz::DAT).unwrap();
        s.compute_impulse_response().unwrap();

        let wf = s.impulse_waveform().unwrap();
        assert_eq!(wf.len(), 15);
        assert!((wf.sample_rate().0 - 48_000.0).abs() < 1e-6);
    }
}
