//! Result output formatting and writing.

use crate::orchestrator::{MeasurementResult, MeasurementResults, SimulationReport};
use crate::OutputFormat;
use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write measurement results to the output directory.
///
/// Each response goes to its own CSV; the summary follows `format`.
pub fn write_results(results: &MeasurementResults, output_dir: &Path, format: OutputFormat) -> Result<()> {
    for (i, capture) in results.captures.iter().enumerate() {
        let path = output_dir.join(response_file_name(i, &capture.source));
        write_response(capture, &path)?;
    }

    let summary_path = output_dir.join(summary_file_name(format));
    let mut f = std::fs::File::create(&summary_path)?;

    match format {
        OutputFormat::Text => {
            writeln!(f, "MLS Impulse Response Summary")?;
            writeln!(f, "============================")?;
            writeln!(f, "Name:     {}", results.name)?;
            writeln!(f, "Order:    {} (P = {})", results.order, results.sequence_len)?;
            for capture in &results.captures {
                writeln!(f)?;
                write_capture_text(&mut f, capture)?;
            }
        }
        OutputFormat::Json => {
            let captures: Vec<_> = results.captures.iter().map(capture_json).collect();
            let json = serde_json::json!({
                "name": results.name,
                "order": results.order,
                "sequence_len": results.sequence_len,
                "captures": captures,
            });
            writeln!(f, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        OutputFormat::Csv => {
            writeln!(f, "source,peak_index,peak_value,energy,offset,periods_averaged,lag,resampled,elapsed_ms")?;
            for c in &results.captures {
                writeln!(
                    f,
                    "{},{},{},{},{},{},{},{},{}",
                    c.source,
                    c.peak_index,
                    c.peak_value,
                    c.energy,
                    c.conditioning.offset,
                    c.conditioning.periods_averaged,
                    c.conditioning.lag.map_or(String::new(), |l| l.to_string()),
                    c.conditioning.resampled,
                    c.elapsed_ms
                )?;
            }
        }
    }

    tracing::info!("Wrote summary to {:?}", summary_path);
    Ok(())
}

/// Write a simulation report to the output directory.
pub fn write_simulation(report: &SimulationReport, output_dir: &Path, format: OutputFormat) -> Result<()> {
    write_response(&report.result, &output_dir.join("simulation_ir.csv"))?;

    let path = output_dir.join(match format {
        OutputFormat::Json => "simulation.json",
        _ => "simulation.txt",
    });
    let mut f = std::fs::File::create(&path)?;

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "capture_len": report.capture_len,
                "max_error": report.max_error,
                "rms_error": report.rms_error,
                "expected": report.expected,
                "result": capture_json(&report.result),
            });
            writeln!(f, "{}", serde_json::to_string_pretty(&json)?)?;
        }
        _ => {
            writeln!(f, "Capture length: {}", report.capture_len)?;
            writeln!(f, "Max error:      {:.3e}", report.max_error)?;
            writeln!(f, "RMS error:      {:.3e}", report.rms_error)?;
            writeln!(f)?;
            write_capture_text(&mut f, &report.result)?;
        }
    }

    tracing::info!("Wrote simulation report to {:?}", path);
    Ok(())
}

/// Print measurement results to stdout.
pub fn print_results(results: &MeasurementResults) {
    println!("\n=== Measurement Results: {} ===\n", results.name);
    println!("Order {} (P = {})", results.order, results.sequence_len);

    for capture in &results.captures {
        println!();
        println!("{}", capture.source);
        println!("  Peak:     {:.6} at tap {}", capture.peak_value, capture.peak_index);
        println!("  Energy:   {:.6}", capture.energy);
        println!(
            "  Averaged: {} periods from offset {}",
            capture.conditioning.periods_averaged, capture.conditioning.offset
        );
    }

    println!();
}

/// Print a simulation report to stdout.
pub fn print_simulation(report: &SimulationReport) {
    println!("\n=== Simulation Results ===\n");
    println!("  Capture:   {} samples", report.capture_len);
    println!("  Max error: {:.3e}", report.max_error);
    println!("  RMS error: {:.3e}", report.rms_error);

    println!("\n  tap  expected   recovered");
    for (i, (e, r)) in report
        .expected
        .iter()
        .zip(&report.result.response.samples)
        .take(16)
        .enumerate()
    {
        println!("  {:>3}  {:>9.5}  {:>9.5}", i, e, r);
    }
    println!();
}

/// Response CSV: time, amplitude, and Schroeder decay.
fn write_response(capture: &MeasurementResult, path: &Path) -> Result<()> {
    let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
    let response = &capture.response;
    let decay = response.energy_decay_db();

    writeln!(f, "sample,time_ms,amplitude,decay_db")?;
    for (i, (&v, d)) in response.samples.iter().zip(&decay).enumerate() {
        writeln!(f, "{},{},{},{}", i, response.time_at(i).as_ms(), v, d)?;
    }
    f.flush()?;

    tracing::info!("Wrote impulse response to {:?}", path);
    Ok(())
}

fn write_capture_text(f: &mut impl Write, capture: &MeasurementResult) -> std::io::Result<()> {
    let c = &capture.conditioning;
    writeln!(f, "Source:   {}", capture.source)?;
    writeln!(f, "  Peak:     {:.6} at tap {}", capture.peak_value, capture.peak_index)?;
    writeln!(f, "  Energy:   {:.6}", capture.energy)?;
    writeln!(f, "  Offset:   {}", c.offset)?;
    if let Some(lag) = c.lag {
        writeln!(f, "  Lag:      {}", lag)?;
    }
    writeln!(f, "  Periods:  {}", c.periods_averaged)?;
    writeln!(f, "  Resampled: {}", c.resampled)?;
    writeln!(f, "  Time:     {:.3} ms", capture.elapsed_ms)
}

fn capture_json(capture: &MeasurementResult) -> serde_json::Value {
    serde_json::json!({
        "source": capture.source,
        "peak_index": capture.peak_index,
        "peak_value": capture.peak_value,
        "energy": capture.energy,
        "offset": capture.conditioning.offset,
        "periods_averaged": capture.conditioning.periods_averaged,
        "lag": capture.conditioning.lag,
        "resampled": capture.conditioning.resampled,
        "elapsed_ms": capture.elapsed_ms,
        "taps": capture.response.samples,
    })
}

fn response_file_name(index: usize, source: &str) -> PathBuf {
    let stem = Path::new(source)
        .file_stem()
        .map_or_else(|| "capture".into(), |s| s.to_string_lossy());
    PathBuf::from(format!("{:02}_{}_ir.csv", index, stem))
}

fn summary_file_name(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Text => "summary.txt",
        OutputFormat::Json => "summary.json",
        OutputFormat::Csv => "summary.csv",
    }
}
