//! `cvgpu devices`

use super::EngineSource;
use crate::cli::OutputFormat;
use anyhow::{Context, Result};
use cvgpu::DeviceInfo;
use std::io::Write;

/// List every device the engine reports
pub fn run_devices(source: &EngineSource, format: OutputFormat, out: &mut impl Write) -> Result<()> {
    let ctx = source.context()?;
    let devices = ctx.devices().context("failed to enumerate devices")?;
    let current = if devices.is_empty() {
        None
    } else {
        Some(ctx.current_device().context("failed to query the current device")?)
    };
    render(&devices, current, format, out)
}

fn render(
    devices: &[DeviceInfo],
    current: Option<i32>,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<()> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(devices)?)?,
        OutputFormat::Plain => {
            for device in devices {
                writeln!(out, "{device}")?;
            }
        }
        OutputFormat::Table => {
            if devices.is_empty() {
                writeln!(out, "No CUDA devices found")?;
                return Ok(());
            }
            let width = devices.iter().map(|d| d.name.len()).max().unwrap_or(0).max(4);
            writeln!(
                out,
                "  {:<5} {:<width$} {:<10} {}",
                "INDEX", "NAME", "CAPABILITY", "SMS"
            )?;
            for device in devices {
                let marker = if Some(device.index) == current { '*' } else { ' ' };
                writeln!(
                    out,
                    "{marker} {:<5} {:<width$} {:<10} {}",
                    device.index,
                    device.name,
                    device.compute_capability.to_string(),
                    device.multiprocessor_count
                )?;
            }
        }
    }
    Ok(())
}
