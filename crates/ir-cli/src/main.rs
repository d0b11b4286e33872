//! mls-ir: impulse-response measurement with maximum length sequences.
//!
//! This is the main entry point for the measurement tool.

mod capture_io;
mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_dsp::window::{playback_buffer, DEFAULT_AMPLITUDE};
use lib_dsp::{LagEstimator, MaximumLengthSequence, MlsOrder};
use lib_types::units::{Hertz, Seconds};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mls-ir")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a looped, tapered MLS playback signal
    Generate {
        /// MLS order (2..=16)
        #[arg(short, long, default_value = "16")]
        order: u32,

        /// Number of periods to repeat
        #[arg(short, long, default_value = "4")]
        periods: usize,

        /// Peak amplitude (0, 1]
        #[arg(short, long, default_value_t = DEFAULT_AMPLITUDE)]
        amplitude: f64,

        /// Fade-in/out length (ms)
        #[arg(long, default_value = "0")]
        taper_ms: f64,

        /// Playback sample rate (Hz)
        #[arg(long, default_value = "48000")]
        rate: f64,

        /// Output CSV path
        #[arg(short = 'O', long)]
        output: Option<PathBuf>,
    },

    /// Measure impulse responses from recorded captures
    Measure {
        /// Path to the measurement configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "output")]
        output: PathBuf,
    },

    /// Measure a synthetic system described in the configuration
    Simulate {
        /// Path to the measurement configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Output directory for results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Estimate the lag between a reference and a recording
    Lag {
        /// Reference CSV (tiled or truncated to the recording length)
        reference: PathBuf,

        /// Recorded CSV
        captured: PathBuf,

        /// Correlate without removing the mean
        #[arg(long)]
        no_mean_removal: bool,

        /// Nominal loop period (samples) for drift estimation
        #[arg(long)]
        period: Option<usize>,

        /// Period search radius (samples)
        #[arg(long, default_value = "8")]
        radius: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Generate { order, periods, amplitude, taper_ms, rate, output } => {
            generate(order, periods, amplitude, taper_ms, rate, output)?;
        }
        Commands::Measure { config, output } => {
            run_measurement(&config, &output, cli.format)?;
        }
        Commands::Simulate { config, output } => {
            run_simulation(&config, output.as_deref(), cli.format)?;
        }
        Commands::Lag { reference, captured, no_mean_removal, period, radius } => {
            estimate_lag(&reference, &captured, !no_mean_removal, period, radius, cli.format)?;
        }
    }

    Ok(())
}

fn generate(
    order: u32,
    periods: usize,
    amplitude: f64,
    taper_ms: f64,
    rate: f64,
    output: Option<PathBuf>,
) -> Result<()> {
    let rate = Hertz(rate);
    if !rate.is_valid_rate() {
        anyhow::bail!("Sample rate must be positive, got {}", rate.0);
    }

    tracing::info!("Generating MLS order {} x {} periods", order, periods);

    let mls = MaximumLengthSequence::generate(MlsOrder::new(order)?);
    let taper_len = Seconds::from_ms(taper_ms).to_samples(rate);
    let buffer = playback_buffer(&mls.excitation(), periods, amplitude, taper_len)?;

    println!("Generated MLS order {}:", order);
    println!("  Period:   {} samples ({:.3} s)", mls.len(), mls.len() as f64 / rate.0);
    println!("  Periods:  {}", periods);
    println!("  Samples:  {}", buffer.len());
    println!("  Taper:    {} samples", taper_len);

    if let Some(output_path) = output {
        capture_io::write_capture(&output_path, &buffer)
            .with_context(|| format!("Failed to write {:?}", output_path))?;
        println!("  Written to: {:?}", output_path);
    }

    Ok(())
}

fn run_measurement(config_path: &Path, output_dir: &Path, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let orchestrator = orchestrator::Orchestrator::new(config);
    let results = orchestrator.measure()?;

    std::fs::create_dir_all(output_dir)?;
    output::write_results(&results, output_dir, format)?;
    output::print_results(&results);

    tracing::info!("Measurement complete. Results written to {:?}", output_dir);
    Ok(())
}

fn run_simulation(config_path: &Path, output_dir: Option<&Path>, format: OutputFormat) -> Result<()> {
    tracing::info!("Loading configuration from {:?}", config_path);

    let config = config::load_config(config_path)?;
    let report = orchestrator::Orchestrator::new(config).simulate()?;

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
        output::write_simulation(&report, dir, format)?;
    }
    output::print_simulation(&report);

    Ok(())
}

fn estimate_lag(
    reference: &Path,
    captured: &Path,
    remove_mean: bool,
    period: Option<usize>,
    radius: usize,
    format: OutputFormat,
) -> Result<()> {
    let reference = capture_io::read_capture(reference)
        .with_context(|| format!("Failed to read reference {:?}", reference))?;
    let captured = capture_io::read_capture(captured)
        .with_context(|| format!("Failed to read recording {:?}", captured))?;

    let mut estimator = LagEstimator::new().with_mean_removal(remove_mean);
    let aligned = LagEstimator::periodic_reference(&reference, captured.len());
    let lag = estimator.estimate(&aligned, &captured)?;

    let drift = period
        .map(|nominal| estimator.estimate_period(&captured, nominal, radius))
        .transpose()?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "len": captured.len(),
                "lag": lag.lag,
                "peak_value": lag.peak_value,
                "neighbours": [lag.neighbours.0, lag.neighbours.1],
                "period": drift.as_ref().map(|d| d.period),
                "drift_ppm": drift.as_ref().map(|d| d.drift.0),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Csv => {
            println!("lag,peak_value,period,drift_ppm");
            println!(
                "{},{},{},{}",
                lag.lag,
                lag.peak_value,
                drift.as_ref().map_or(String::new(), |d| d.period.to_string()),
                drift.as_ref().map_or(String::new(), |d| d.drift.0.to_string())
            );
        }
        OutputFormat::Text => {
            println!("Lag: {} samples (of {})", lag.lag, captured.len());
            println!("  Peak:       {:.6}", lag.peak_value);
            println!("  Neighbours: {:.6}, {:.6}", lag.neighbours.0, lag.neighbours.1);
            if let Some(d) = drift {
                println!("Period: {:.4} samples", d.period);
                println!("  Ratio: {:.8}", d.ratio);
                println!("  Drift: {:.2} ppm", d.drift.0);
            }
        }
    }

    Ok(())
}
