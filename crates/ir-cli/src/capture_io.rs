//! Capture file reading and writing.
//!
//! Captures are plain CSV-like text:
//! - optional header line (first non-comment line starting with a letter)
//! - one sample per line, either `value` or `index,value`
//! - blank lines and `#` comments anywhere

use nom::{
    branch::alt,
    character::complete::{char, line_ending, not_line_ending, satisfy, space0},
    combinator::{eof, opt, value},
    multi::many0,
    number::complete::double,
    sequence::{preceded, terminated},
    IResult, Parser,
};
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Errors reading a capture file.
#[derive(Debug, Error)]
pub enum CaptureParseError {
    /// I/O error reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A line that is neither a sample, a comment, nor the header.
    #[error("Syntax error at line {line}: {text:?}")]
    Syntax { line: usize, text: String },

    /// File holds no samples.
    #[error("Capture contains no samples")]
    Empty,
}

/// Parse capture text into samples.
pub fn parse_capture(content: &str) -> Result<Vec<f64>, CaptureParseError> {
    let (remaining, samples) = capture_file(content).map_err(|_| syntax_error(content, content))?;

    if !remaining.trim().is_empty() {
        return Err(syntax_error(content, remaining));
    }
    if samples.is_empty() {
        return Err(CaptureParseError::Empty);
    }
    Ok(samples)
}

/// Read and parse a capture file.
pub fn read_capture(path: &Path) -> Result<Vec<f64>, CaptureParseError> {
    let content = std::fs::read_to_string(path)?;
    let samples = parse_capture(&content)?;
    tracing::debug!(path = %path.display(), samples = samples.len(), "read capture");
    Ok(samples)
}

/// Write samples as `sample,value` CSV.
pub fn write_capture(path: &Path, samples: &[f64]) -> std::io::Result<()> {
    let mut f = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(f, "sample,value")?;
    for (i, v) in samples.iter().enumerate() {
        writeln!(f, "{},{}", i, v)?;
    }
    f.flush()
}

fn syntax_error(content: &str, remaining: &str) -> CaptureParseError {
    let consumed = &content[..content.len() - remaining.len()];
    let line = consumed.matches('\n').count() + 1;
    let text = remaining.lines().next().unwrap_or_default().to_string();
    CaptureParseError::Syntax { line, text }
}

fn capture_file(input: &str) -> IResult<&str, Vec<f64>> {
    let (input, _) = many0(skip_line).parse(input)?;
    let (input, _) = opt(header_line).parse(input)?;
    let (input, samples) = many0(preceded(many0(skip_line), sample_line)).parse(input)?;
    let (input, _) = many0(skip_line).parse(input)?;
    Ok((input, samples))
}

/// Blank line or `#` comment.
fn skip_line(input: &str) -> IResult<&str, ()> {
    value(
        (),
        (space0, opt(preceded(char('#'), not_line_ending)), line_ending),
    )
    .parse(input)
}

fn header_line(input: &str) -> IResult<&str, ()> {
    value(
        (),
        (
            space0,
            satisfy(|c: char| c.is_ascii_alphabetic()),
            not_line_ending,
            alt((line_ending, eof)),
        ),
    )
    .parse(input)
}

/// `value` or `index,value`; the last number on the line is the sample.
fn sample_line(input: &str) -> IResult<&str, f64> {
    let (input, _) = space0(input)?;
    let (input, first) = double(input)?;
    let (input, second) = opt(preceded((space0, char(','), space0), double)).parse(input)?;
    let (input, _) = terminated(space0, alt((line_ending, eof))).parse(input)?;
    Ok((input, second.unwrap_or(first)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_column() {
        let samples = parse_capture("0.5\n-0.25\n1e-3\n").unwrap();
        assert_eq!(samples, vec![0.5, -0.25, 1e-3]);
    }

    #[test]
    fn test_indexed_with_header_and_comments() {
        let text = "# recorded at 48 kHz\nsample,value\n0,0.5\n\n1, -0.5\n# tail\n2,0.125";
        assert_eq!(parse_capture(text).unwrap(), vec![0.5, -0.5, 0.125]);
    }

    #[test]
    fn test_crlf_line_endings() {
        assert_eq!(parse_capture("value\r\n1.0\r\n2.0\r\n").unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse_capture("value\n1.0\nabc\n3.0\n").unwrap_err();
        match err {
            CaptureParseError::Syntax { line, text } => {
                assert_eq!(line, 3);
                assert_eq!(text, "abc");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_empty_capture() {
        assert!(matches!(
            parse_capture("sample,value\n"),
            Err(CaptureParseError::Empty)
        ));
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        let samples = vec![0.0, 0.5, -1.0];

        write_capture(&path, &samples).unwrap();
        assert_eq!(read_capture(&path).unwrap(), samples);
    }
}
