//! cvgpu command line
//!
//! Usage:
//!   cvgpu probe                       Report whether a CUDA device is available
//!   cvgpu devices                     List CUDA devices
//!   cvgpu selftest [--rows N] ...     Round-trip a matrix through device memory
//!
//! `--mock` runs every command against the host-memory engine.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use std::io;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
use commands::EngineSource;

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let source = EngineSource::from_flags(cli.mock, cli.config.as_deref())?;
    let mut out = io::stdout().lock();

    let success = match cli.command {
        Commands::Probe => {
            commands::run_probe(&source, cli.format, &mut out)?;
            true
        }
        Commands::Devices => {
            commands::run_devices(&source, cli.format, &mut out)?;
            true
        }
        Commands::Selftest {
            rows,
            cols,
            channels,
        } => commands::run_selftest(&source, rows, cols, channels, cli.format, &mut out)?,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
