//! Command line structure

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cvgpu - inspect CUDA devices through the cvextern GPU binding
#[derive(Parser, Debug)]
#[command(name = "cvgpu")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Engine configuration file (TOML, YAML or JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use the host-memory mock engine instead of the native libraries
    #[arg(long, global = true)]
    pub mock: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Plain,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Report whether a CUDA device is available
    Probe,

    /// List CUDA devices
    Devices,

    /// Allocate, upload a pattern, download it back and compare
    Selftest {
        /// Matrix rows
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(i32).range(1..))]
        rows: i32,

        /// Matrix columns
        #[arg(long, default_value_t = 64, value_parser = clap::value_parser!(i32).range(1..))]
        cols: i32,

        /// Channels per element (1 or 4)
        #[arg(long, default_value_t = 4, value_parser = parse_channels)]
        channels: i32,
    },
}

fn parse_channels(value: &str) -> Result<i32, String> {
    match value {
        "1" => Ok(1),
        "4" => Ok(4),
        other => Err(format!("{other} is not a supported channel count, use 1 or 4")),
    }
}
