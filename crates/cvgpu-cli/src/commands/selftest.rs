//! `cvgpu selftest`

use super::EngineSource;
use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use cvgpu::host::buffer_len;
use cvgpu::{HostMat, MatType, Size};
use serde::Serialize;
use std::io::Write;
use tracing::info;

/// Outcome of one allocate/upload/download cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelftestReport {
    pub engine: &'static str,
    pub rows: i32,
    pub cols: i32,
    pub channels: i32,
    pub reported_size: Size,
    pub reported_channels: i32,
    /// Bytes that differ after the round trip
    pub mismatched_bytes: usize,
}

impl SelftestReport {
    pub fn passed(&self) -> bool {
        self.reported_size == Size::new(self.cols, self.rows)
            && self.reported_channels == self.channels
            && self.mismatched_bytes == 0
    }
}

/// Run the self test and print its report. Returns whether it passed.
pub fn run_selftest(
    source: &EngineSource,
    rows: i32,
    cols: i32,
    channels: i32,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<bool> {
    let report = selftest(source, rows, cols, channels)?;
    info!(passed = report.passed(), mismatched = report.mismatched_bytes, "selftest finished");
    render(&report, format, out)?;
    Ok(report.passed())
}

fn selftest(source: &EngineSource, rows: i32, cols: i32, channels: i32) -> Result<SelftestReport> {
    let mat_type = if channels == 1 {
        MatType::CV_8UC1
    } else {
        MatType::CV_8UC4
    };
    let ctx = source.context()?;

    let mut device = ctx
        .allocate(rows, cols, mat_type)
        .context("device allocation failed")?;
    let reported_size = device.size()?;
    let reported_channels = device.channels()?;

    let host = pattern(rows, cols, mat_type)?;
    device.upload(&host).context("upload failed")?;
    let back = device.to_host().context("download failed")?;

    Ok(SelftestReport {
        engine: source.name(),
        rows,
        cols,
        channels,
        reported_size,
        reported_channels,
        mismatched_bytes: count_mismatches(host.as_bytes(), back.as_bytes()),
    })
}

/// Deterministic byte pattern that differs between neighbouring elements
fn pattern(rows: i32, cols: i32, mat_type: MatType) -> Result<HostMat> {
    let len = buffer_len(rows, cols, mat_type)?;
    let bytes = (0..len).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect();
    Ok(HostMat::from_bytes(rows, cols, mat_type, bytes)?)
}

fn count_mismatches(expected: &[u8], actual: &[u8]) -> usize {
    let differing = expected.iter().zip(actual).filter(|(a, b)| a != b).count();
    differing + expected.len().abs_diff(actual.len())
}

fn render(report: &SelftestReport, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let verdict = if report.passed() { "PASS" } else { "FAIL" };
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(report)?;
            value["passed"] = serde_json::Value::Bool(report.passed());
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        OutputFormat::Plain => writeln!(out, "{verdict}")?,
        OutputFormat::Table => {
            writeln!(out, "engine:     {}", report.engine)?;
            writeln!(
                out,
                "matrix:     {}x{}, {} channel(s)",
                report.rows, report.cols, report.channels
            )?;
            writeln!(
                out,
                "reported:   {} with {} channel(s)",
                report.reported_size, report.reported_channels
            )?;
            writeln!(out, "mismatches: {}", report.mismatched_bytes)?;
            writeln!(out, "result:     {verdict}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvgpu::MockEngine;
    use std::sync::Arc;

    fn mock() -> (EngineSource, Arc<MockEngine>) {
        let engine = Arc::new(MockEngine::new());
        (EngineSource::Mock(engine.clone()), engine)
    }

    #[test]
    fn test_selftest_passes_on_mock() {
        let (source, engine) = mock();
        let mut out = Vec::new();
        assert!(run_selftest(&source, 12, 8, 1, OutputFormat::Table, &mut out).unwrap());

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("matrix:     12x8, 1 channel(s)"));
        assert!(text.contains("reported:   8x12 with 1 channel(s)"));
        assert!(text.contains("result:     PASS"));
        assert_eq!(engine.live_mats(), 0);
    }

    #[test]
    fn test_selftest_json() {
        let (source, _) = mock();
        let mut out = Vec::new();
        run_selftest(&source, 4, 6, 4, OutputFormat::Json, &mut out).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["passed"], true);
        assert_eq!(value["reported_channels"], 4);
        assert_eq!(value["reported_size"]["width"], 6);
        assert_eq!(value["mismatched_bytes"], 0);
    }

    #[test]
    fn test_selftest_allocation_failure() {
        let engine = Arc::new(MockEngine::new().with_memory_limit(16));
        let mut out = Vec::new();
        let err = run_selftest(
            &EngineSource::Mock(engine),
            64,
            64,
            4,
            OutputFormat::Plain,
            &mut out,
        )
        .unwrap_err();
        assert!(err.to_string().contains("device allocation failed"));
    }

    #[test]
    fn test_report_verdict() {
        let mut report = SelftestReport {
            engine: "mock",
            rows: 2,
            cols: 3,
            channels: 4,
            reported_size: Size::new(3, 2),
            reported_channels: 4,
            mismatched_bytes: 0,
        };
        assert!(report.passed());

        report.mismatched_bytes = 1;
        assert!(!report.passed());

        report.mismatched_bytes = 0;
        report.reported_size = Size::new(2, 3);
        assert!(!report.passed());

        let mut out = Vec::new();
        render(&report, OutputFormat::Plain, &mut out).unwrap();
        assert_eq!(out, b"FAIL\n");
    }

    #[test]
    fn test_count_mismatches() {
        assert_eq!(count_mismatches(&[1, 2, 3], &[1, 2, 3]), 0);
        assert_eq!(count_mismatches(&[1, 2, 3], &[1, 0, 3]), 1);
        assert_eq!(count_mismatches(&[1, 2, 3], &[1, 2]), 1);
    }

    #[test]
    fn test_pattern_is_not_constant() {
        let host = pattern(4, 4, MatType::CV_8UC1).unwrap();
        let bytes = host.as_bytes();
        assert!(bytes.windows(2).any(|w| w[0] != w[1]));
    }
}
