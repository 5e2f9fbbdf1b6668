//! `cvgpu probe`

use super::EngineSource;
use crate::cli::OutputFormat;
use anyhow::Result;
use cvgpu::CapabilityProbe;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ProbeOutput {
    engine: &'static str,
    available: bool,
}

/// Print whether a CUDA device is available. Returns the probe result.
pub fn run_probe(source: &EngineSource, format: OutputFormat, out: &mut impl Write) -> Result<bool> {
    let available = CapabilityProbe::new().probe_with(|| source.engine());
    let output = ProbeOutput {
        engine: source.name(),
        available,
    };

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?,
        OutputFormat::Plain => writeln!(out, "{available}")?,
        OutputFormat::Table => {
            let answer = if available { "yes" } else { "no" };
            writeln!(out, "{:<8} {}", "ENGINE", "CUDA")?;
            writeln!(out, "{:<8} {}", output.engine, answer)?;
        }
    }
    Ok(available)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvgpu::MockEngine;
    use std::sync::Arc;

    fn run(source: &EngineSource, format: OutputFormat) -> (bool, String) {
        let mut out = Vec::new();
        let available = run_probe(source, format, &mut out).unwrap();
        (available, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_probe_mock_table() {
        let source = EngineSource::Mock(Arc::new(MockEngine::new()));
        let (available, text) = run(&source, OutputFormat::Table);
        assert!(available);
        assert!(text.contains("ENGINE"));
        assert!(text.contains("mock     yes"));
    }

    #[test]
    fn test_probe_plain_without_devices() {
        let source = EngineSource::Mock(Arc::new(MockEngine::without_devices()));
        let (available, text) = run(&source, OutputFormat::Plain);
        assert!(!available);
        assert_eq!(text, "false\n");
    }

    #[test]
    fn test_probe_json() {
        let source = EngineSource::Mock(Arc::new(MockEngine::new()));
        let (_, text) = run(&source, OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["engine"], "mock");
        assert_eq!(value["available"], true);
    }

    #[test]
    fn test_probe_missing_native_library() {
        let config = cvgpu::EngineConfig {
            core_library: "cvgpu_cli_missing_core".to_string(),
            ..Default::default()
        };
        let (available, text) = run(&EngineSource::Native(config), OutputFormat::Plain);
        assert!(!available);
        assert_eq!(text, "false\n");
    }
}
