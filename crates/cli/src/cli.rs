//! CLI argument definitions using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// PixTrigger - capture and geotag images on vehicle camera triggers
#[derive(Parser, Debug)]
#[command(
    name = "pixtrigger",
    author,
    version,
    about = "Capture and geotag images on vehicle camera triggers",
    long_about = "Companion-computer agent for MAVLink vehicles.\n\n\
                  Connects to the autopilot, waits for the vehicle to be discovered, \n\
                  streams its position and takes one geotagged photograph per \n\
                  camera trigger until interrupted."
)]
pub struct Cli {
    /// Vehicle connection: tcp://[host][:port], udp://[host][:port] or serial:///path[:baudrate]
    pub descriptor: String,

    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, env = "PIXTRIGGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, env = "PIXTRIGGER_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format (overrides configuration)
    #[arg(long, value_enum, env = "PIXTRIGGER_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Prometheus metrics port (overrides configuration)
    #[arg(long, env = "PIXTRIGGER_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// How long to wait for the vehicle (ms, overrides configuration)
    #[arg(long, env = "PIXTRIGGER_DISCOVERY_TIMEOUT_MS")]
    pub discovery_timeout_ms: Option<u64>,

    /// Store images in this directory instead of removable media
    #[arg(long, env = "PIXTRIGGER_STORAGE_DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Render test frames instead of running the capture program
    #[arg(long)]
    pub synthetic_camera: bool,

    /// Validate configuration and descriptor, print them and exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
