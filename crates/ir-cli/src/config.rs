//! Measurement configuration loading and validation.

use anyhow::{Context, Result};
use lib_dsp::mls::{MAX_ORDER, MIN_ORDER};
use lib_dsp::ConditioningConfig;
use lib_session::{GenerationPolicy, SessionConfig};
use lib_types::units::Hertz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level measurement configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Measurement name/description.
    pub name: String,

    /// MLS order `N`; the excitation is `2^N - 1` samples.
    #[serde(default = "default_order")]
    pub order: u32,

    /// Playback device sample rate (Hz).
    #[serde(default = "default_sample_rate")]
    pub source_sample_rate: f64,

    /// Capture device sample rate (Hz).
    #[serde(default = "default_sample_rate")]
    pub sink_sample_rate: f64,

    /// Require the excitation to be generated explicitly before computing.
    #[serde(default)]
    pub strict: bool,

    /// Capture files and conditioning.
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Synthetic measurement parameters.
    #[serde(default)]
    pub simulation: SimulationParams,

    /// Output configuration.
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_order() -> u32 { 16 }
fn default_sample_rate() -> f64 { 48_000.0 }

/// Capture files and how to condition them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture CSV files, one impulse response each.
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Settling periods discarded before averaging.
    #[serde(default = "default_skip_periods")]
    pub skip_periods: usize,

    /// Align the analysis window with the lag estimator. Off by default,
    /// which keeps the propagation delay in the response.
    #[serde(default)]
    pub align_lag: bool,

    /// Resample captures recorded at a different rate.
    #[serde(default = "default_true")]
    pub compensate_drift: bool,

    /// Remove the mean before lag estimation.
    #[serde(default = "default_true")]
    pub remove_mean: bool,

    /// Samples kept ahead of the direct arrival.
    #[serde(default)]
    pub pre_roll: usize,
}

fn default_skip_periods() -> usize { 1 }
fn default_true() -> bool { true }

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            skip_periods: default_skip_periods(),
            align_lag: false,
            compensate_drift: true,
            remove_mean: true,
            pre_roll: 0,
        }
    }
}

/// Synthetic measurement parameters for `simulate`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Impulse response of the simulated system.
    #[serde(default = "default_filter")]
    pub filter: Vec<f64>,

    /// Circular delay applied to the looped response (samples).
    #[serde(default)]
    pub delay: usize,

    /// Periods of looped playback to record.
    #[serde(default = "default_periods")]
    pub periods: usize,

    /// Peak amplitude of uniform noise added to the capture.
    #[serde(default)]
    pub noise_floor: f64,

    /// Noise generator seed.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_filter() -> Vec<f64> { vec![2.0, 0.4, 0.2, -0.1, -0.8] }
fn default_periods() -> usize { 4 }
fn default_seed() -> u64 { 0x5eed }

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            delay: 0,
            periods: default_periods(),
            noise_floor: 0.0,
            seed: default_seed(),
        }
    }
}

/// Output configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Leading taps of each impulse response to write.
    #[serde(default = "default_taps")]
    pub taps: usize,

    /// Scale each response to unit peak before writing.
    #[serde(default)]
    pub normalize: bool,
}

fn default_taps() -> usize { 1024 }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            taps: default_taps(),
            normalize: false,
        }
    }
}

/// Load configuration from a file.
pub fn load_config(path: &Path) -> Result<MeasurementConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content, path.extension().map_or(false, |e| e == "json"))?;
    validate_config(&config)?;

    Ok(config)
}

fn parse_config(content: &str, json: bool) -> Result<MeasurementConfig> {
    let config = if json {
        serde_json::from_str(content).with_context(|| "Failed to parse config as JSON")?
    } else {
        toml::from_str(content).with_context(|| "Failed to parse config as TOML")?
    };
    Ok(config)
}

/// Validate configuration.
pub fn validate_config(config: &MeasurementConfig) -> Result<()> {
    if !(MIN_ORDER..=MAX_ORDER).contains(&config.order) {
        anyhow::bail!(
            "Invalid MLS order: {}. Must be in {}..={}",
            config.order,
            MIN_ORDER,
            MAX_ORDER
        );
    }

    for (label, rate) in [
        ("source_sample_rate", config.source_sample_rate),
        ("sink_sample_rate", config.sink_sample_rate),
    ] {
        if !Hertz(rate).is_valid_rate() {
            anyhow::bail!("{} must be a positive finite rate, got {}", label, rate);
        }
    }

    for file in &config.capture.files {
        if !file.exists() {
            anyhow::bail!("Capture file not found: {:?}", file);
        }
    }

    let sim = &config.simulation;
    if sim.filter.is_empty() {
        anyhow::bail!("simulation.filter must have at least one tap");
    }
    if sim.periods == 0 {
        anyhow::bail!("simulation.periods must be at least 1");
    }
    if !(sim.noise_floor >= 0.0 && sim.noise_floor.is_finite()) {
        anyhow::bail!("simulation.noise_floor must be non-negative, got {}", sim.noise_floor);
    }

    if config.output.taps == 0 {
        anyhow::bail!("output.taps must be at least 1");
    }

    Ok(())
}

impl MeasurementConfig {
    pub fn source_rate(&self) -> Hertz {
        Hertz(self.source_sample_rate)
    }

    pub fn sink_rate(&self) -> Hertz {
        Hertz(self.sink_sample_rate)
    }

    /// Sequence length `P` for the configured order.
    pub fn sequence_len(&self) -> usize {
        (1usize << self.order) - 1
    }

    pub fn conditioning(&self) -> ConditioningConfig {
        ConditioningConfig {
            skip_periods: self.capture.skip_periods,
            align_lag: self.capture.align_lag,
            compensate_drift: self.capture.compensate_drift,
            remove_mean: self.capture.remove_mean,
            pre_roll: self.capture.pre_roll,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            policy: if self.strict {
                GenerationPolicy::Strict
            } else {
                GenerationPolicy::OnDemand
            },
            conditioning: self.conditioning(),
        }
    }
}
