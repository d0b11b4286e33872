//! Measurement orchestration.

use crate::capture_io::read_capture;
use crate::config::MeasurementConfig;
use anyhow::{Context, Result};
use lib_dsp::convolution::{circular_convolve, circular_delay, fft_circular_convolve};
use lib_dsp::resample::resample;
use lib_dsp::{ArtifactCache, OrderArtifacts};
use lib_session::{ConditioningSummary, MlsSession};
use lib_types::waveform::Waveform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Filters longer than this are convolved through the FFT.
const DIRECT_CONVOLUTION_TAPS: usize = 64;

/// Measurement orchestrator.
pub struct Orchestrator {
    config: MeasurementConfig,
    cache: Arc<ArtifactCache>,
}

/// One impulse response recovered from one capture.
#[derive(Clone, Debug)]
pub struct MeasurementResult {
    /// Capture file, or `"simulation"`.
    pub source: String,

    /// Leading taps of the response at the source rate.
    pub response: Waveform,

    /// Tap of maximum magnitude over the whole period.
    pub peak_index: usize,

    /// Signed value at `peak_index`, before normalization.
    pub peak_value: f64,

    /// Energy of the whole period.
    pub energy: f64,

    /// How the capture was reduced to one period.
    pub conditioning: ConditioningSummary,

    /// Wall time for conditioning and deconvolution.
    pub elapsed_ms: f64,
}

/// All results of one `measure` run.
#[derive(Clone, Debug)]
pub struct MeasurementResults {
    pub name: String,
    pub order: u32,
    pub sequence_len: usize,
    pub captures: Vec<MeasurementResult>,
}

/// Outcome of a synthetic measurement.
#[derive(Clone, Debug)]
pub struct SimulationReport {
    pub result: MeasurementResult,

    /// Samples in the synthesized capture.
    pub capture_len: usize,

    /// The configured filter as it should appear in the response, given the
    /// reported alignment offset (leading taps only).
    pub expected: Vec<f64>,

    /// Largest absolute error over the whole period.
    pub max_error: f64,

    /// RMS error over the whole period.
    pub rms_error: f64,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(config: MeasurementConfig) -> Self {
        Self::with_cache(config, Arc::new(ArtifactCache::new()))
    }

    /// Create an orchestrator sharing an existing artifact cache.
    pub fn with_cache(config: MeasurementConfig, cache: Arc<ArtifactCache>) -> Self {
        Self { config, cache }
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    /// Measure every configured capture file in parallel.
    pub fn measure(&self) -> Result<MeasurementResults> {
        let files = &self.config.capture.files;
        if files.is_empty() {
            anyhow::bail!("No capture files configured (capture.files is empty)");
        }

        tracing::info!(
            "Starting measurement '{}': {} captures at order {}",
            self.config.name,
            files.len(),
            self.config.order
        );

        let artifacts = self.artifacts()?;
        let captures = files
            .par_iter()
            .map(|path| self.measure_file(path, &artifacts))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!("Measurement complete");
        Ok(MeasurementResults {
            name: self.config.name.clone(),
            order: self.config.order,
            sequence_len: artifacts.excitation.len(),
            captures,
        })
    }

    /// Synthesize a looped capture through the configured filter and
    /// measure it.
    pub fn simulate(&self) -> Result<SimulationReport> {
        let sim = &self.config.simulation;
        let artifacts = self.artifacts()?;
        let p = artifacts.excitation.len();

        tracing::info!(
            "Simulating '{}': order {}, {} taps, delay {}, {} periods",
            self.config.name,
            self.config.order,
            sim.filter.len(),
            sim.delay,
            sim.periods
        );

        let capture = self.synthesize_capture(&artifacts)?;
        let capture_len = capture.len();

        let mut session = self.session(&artifacts)?;
        session.load_capture(&capture)?;
        let start = Instant::now();
        session.compute_impulse_response()?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

        let offset = session
            .last_conditioning()
            .map_or(0, |summary| summary.offset);
        let expected_full = expected_response(&sim.filter, sim.delay, offset, p);
        let recovered = session.impulse_waveform()?;

        let (max_error, sum_sq) = recovered
            .samples
            .iter()
            .zip(&expected_full)
            .map(|(r, e)| (r - e).abs())
            .fold((0.0_f64, 0.0), |(max, sum), err| (max.max(err), sum + err * err));
        let rms_error = (sum_sq / p as f64).sqrt();

        tracing::info!(max_error, rms_error, "simulation complete");

        let result = self.summarize("simulation".to_string(), &session, elapsed_ms)?;
        let expected = expected_full[..result.response.len()].to_vec();

        Ok(SimulationReport {
            result,
            capture_len,
            expected,
            max_error,
            rms_error,
        })
    }

    fn artifacts(&self) -> Result<Arc<OrderArtifacts>> {
        self.cache
            .get(self.config.order)
            .with_context(|| format!("Failed to build MLS artifacts for order {}", self.config.order))
    }

    fn session(&self, artifacts: &Arc<OrderArtifacts>) -> Result<MlsSession> {
        let session = MlsSession::with_artifacts(
            Arc::clone(artifacts),
            self.config.source_rate(),
            self.config.sink_rate(),
            self.config.session_config(),
        )?;
        Ok(session)
    }

    fn measure_file(&self, path: &Path, artifacts: &Arc<OrderArtifacts>) -> Result<MeasurementResult> {
        let samples = read_capture(path)
            .with_context(|| format!("Failed to read capture {:?}", path))?;

        let mut session = self.session(artifacts)?;
        session
            .load_capture(&samples)
            .with_context(|| format!("Capture {:?} is shorter than one period", path))?;

        let start = Instant::now();
        session
            .compute_impulse_response()
            .with_context(|| format!("Failed to compute impulse response for {:?}", path))?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1e3;

        self.summarize(path.display().to_string(), &session, elapsed_ms)
    }

    /// Looped playback of the excitation through the simulated system, as
    /// recorded by the sink device.
    fn synthesize_capture(&self, artifacts: &OrderArtifacts) -> Result<Vec<f64>> {
        let sim = &self.config.simulation;
        let p = artifacts.excitation.len();

        let one_period = if sim.filter.len() > DIRECT_CONVOLUTION_TAPS {
            fft_circular_convolve(&artifacts.excitation, &sim.filter)
                .context("Failed to convolve the excitation with the simulated filter")?
        } else {
            circular_convolve(&artifacts.excitation, &sim.filter)
        };
        let looped: Vec<f64> = one_period
            .iter()
            .copied()
            .cycle()
            .take(p * sim.periods)
            .collect();
        let delayed = circular_delay(&looped, sim.delay);

        let mut capture = if self.config.source_rate() == self.config.sink_rate() {
            delayed
        } else {
            resample(&delayed, self.config.source_rate(), self.config.sink_rate())
                .context("Failed to resample synthetic capture to the sink rate")?
        };

        if sim.noise_floor > 0.0 {
            let mut rng = StdRng::seed_from_u64(sim.seed);
            for v in &mut capture {
                *v += rng.gen_range(-sim.noise_floor..=sim.noise_floor);
            }
        }

        Ok(capture)
    }

    fn summarize(&self, source: String, session: &MlsSession, elapsed_ms: f64) -> Result<MeasurementResult> {
        let mut response = session.impulse_waveform()?;
        let peak_index = response.peak_index().unwrap_or(0);
        let peak_value = response.samples.get(peak_index).copied().unwrap_or(0.0);
        let energy = response.energy();

        response.truncate(self.config.output.taps);
        if self.config.output.normalize && peak_value != 0.0 {
            response.scale(1.0 / peak_value.abs());
        }

        let conditioning = session
            .last_conditioning()
            .cloned()
            .context("Session computed a response without conditioning it")?;

        Ok(MeasurementResult {
            source,
            response,
            peak_index,
            peak_value,
            energy,
            conditioning,
            elapsed_ms,
        })
    }
}

/// Where each filter tap lands in a response measured from a capture delayed
/// by `delay` and read from `offset`.
fn expected_response(filter: &[f64], delay: usize, offset: usize, p: usize) -> Vec<f64> {
    let mut expected = vec![0.0; p];
    let shift = (delay % p + p - offset % p) % p;
    for (i, &h) in filter.iter().enumerate() {
        expected[(i + shift) % p] += h;
    }
    expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture_io::write_capture;
    use crate::config::{CaptureConfig, OutputConfig, SimulationParams};

    fn config(order: u32) -> MeasurementConfig {
        MeasurementConfig {
            name: "test".to_string(),
            order,
            source_sample_rate: 48_000.0,
            sink_sample_rate: 48_000.0,
            strict: false,
            capture: CaptureConfig::default(),
            simulation: SimulationParams::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_expected_response_shift() {
        assert_eq!(expected_response(&[1.0, 2.0], 0, 0, 5), vec![1.0, 2.0, 0.0, 0.0, 0.0]);
        assert_eq!(expected_response(&[1.0, 2.0], 4, 0, 5), vec![2.0, 0.0, 0.0, 0.0, 1.0]);
        assert_eq!(expected_response(&[1.0, 2.0], 4, 4, 5), vec![1.0, 2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_simulate_recovers_filter() {
        let mut cfg = config(8);
        cfg.simulation.delay = 40;
        cfg.capture.align_lag = true;

        let report = Orchestrator::new(cfg).simulate().unwrap();

        assert_eq!(report.capture_len, 4 * 255);
        assert_eq!(report.result.conditioning.offset, 40);
        assert_eq!(report.result.conditioning.periods_averaged, 2);
        assert_eq!(report.result.peak_index, 0);
        assert!((report.result.peak_value - 2.0).abs() < 1e-9);
        assert!(report.max_error < 1e-9, "max error {}", report.max_error);
        assert_eq!(&report.expected[..5], &[2.0, 0.4, 0.2, -0.1, -0.8]);
    }

    #[test]
    fn test_simulate_defaults_keep_delay() {
        let mut cfg = config(7);
        cfg.simulation.delay = 10;

        let report = Orchestrator::new(cfg).simulate().unwrap();

        assert_eq!(report.result.conditioning.offset, 0);
        assert_eq!(report.result.peak_index, 10);
        assert!(report.max_error < 1e-9);
    }

    #[test]
    fn test_simulate_with_noise_is_deterministic() {
        let mut cfg = config(10);
        cfg.simulation.noise_floor = 0.01;
        cfg.simulation.periods = 8;

        let first = Orchestrator::new(cfg.clone()).simulate().unwrap();
        let second = Orchestrator::new(cfg).simulate().unwrap();

        assert_eq!(first.result.response, second.result.response);
        assert!(first.max_error > 0.0);
        assert!(first.max_error < 0.01, "max error {}", first.max_error);
    }

    #[test]
    fn test_simulate_long_filter() {
        let mut cfg = config(10);
        cfg.simulation.filter = (0..200)
            .map(|i| 0.97_f64.powi(i) * if i % 2 == 0 { 1.0 } else { -0.5 })
            .collect();
        cfg.simulation.delay = 5;

        let report = Orchestrator::new(cfg).simulate().unwrap();

        assert_eq!(report.result.conditioning.offset, 0);
        assert_eq!(report.result.peak_index, 5);
        assert!(report.max_error < 1e-9, "max error {}", report.max_error);
    }

    #[test]
    fn test_simulate_drifting_sink() {
        let mut cfg = config(10);
        cfg.sink_sample_rate = 48_005.0;
        cfg.simulation.delay = 37;
        cfg.capture.align_lag = true;

        let report = Orchestrator::new(cfg).simulate().unwrap();

        assert!(report.result.conditioning.resampled);
        assert_eq!(report.result.conditioning.offset, 37);
        assert_eq!(report.result.peak_index, 0);
        assert!(report.max_error < 0.02, "max error {}", report.max_error);
    }

    #[test]
    fn test_measure_files_in_parallel() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(ArtifactCache::new());
        let artifacts = cache.get(9).unwrap();
        let one_period = circular_convolve(&artifacts.excitation, &[0.0, 0.0, 1.0, -0.5]);

        let mut files = Vec::new();
        for (i, delay) in [0usize, 77, 300].into_iter().enumerate() {
            let looped: Vec<f64> = one_period.iter().copied().cycle().take(3 * 511).collect();
            let path = dir.path().join(format!("capture_{i}.csv"));
            write_capture(&path, &circular_delay(&looped, delay)).unwrap();
            files.push(path);
        }

        let mut cfg = config(9);
        cfg.capture.files = files;
        cfg.capture.align_lag = true;
        cfg.capture.pre_roll = 2;
        cfg.output.taps = 16;
        cfg.output.normalize = true;

        let results = Orchestrator::with_cache(cfg, Arc::clone(&cache)).measure().unwrap();

        assert_eq!(results.sequence_len, 511);
        assert_eq!(results.captures.len(), 3);
        assert_eq!(cache.len(), 1);
        for capture in &results.captures {
            assert_eq!(capture.response.len(), 16);
            assert_eq!(capture.peak_index, 2);
            assert!((capture.response.samples[2] - 1.0).abs() < 1e-9);
            assert!((capture.response.samples[3] + 0.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_measure_without_files_fails() {
        assert!(Orchestrator::new(config(8)).measure().is_err());
    }
}
