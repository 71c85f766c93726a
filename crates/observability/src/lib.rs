//! # Observability
//!
//! Tracing initialisation and Prometheus metrics for the agent.
//!
//! ## Features
//!
//! - Tracing setup (pretty / compact / JSON), honours `RUST_LOG`
//! - Prometheus exporter
//! - Capture metrics recording and the shutdown summary
//!
//! ## Example
//!
//! ```ignore
//! use observability::{init_with_config, record_capture_outcome, ObservabilityConfig};
//!
//! init_with_config(ObservabilityConfig::default())?;
//!
//! while let Ok(outcome) = outcomes.recv().await {
//!     record_capture_outcome(&outcome);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use contracts::{LogFormatSetting, ObservabilitySettings};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Re-exports
pub use crate::metrics::{
    record_capture_outcome, record_position_update, record_sequence, record_trigger_received,
    CaptureSummary, CaptureSummaryAggregator, RunningStats, StatsSummary,
};

/// Initialize observability with defaults (pretty logs, no exporter)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Log format
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Default log level when `RUST_LOG` is unset
    pub default_log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            metrics_port: None,
            default_log_level: "info".to_string(),
        }
    }
}

impl From<&ObservabilitySettings> for ObservabilityConfig {
    fn from(settings: &ObservabilitySettings) -> Self {
        Self {
            log_format: settings.log_format.into(),
            metrics_port: settings.metrics_port,
            default_log_level: settings.default_log_level.clone(),
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON logs
    Json,
    /// Human-readable multi-line
    #[default]
    Pretty,
    /// Compact single line
    Compact,
}

impl From<LogFormatSetting> for LogFormat {
    fn from(setting: LogFormatSetting) -> Self {
        match setting {
            LogFormatSetting::Json => Self::Json,
            LogFormatSetting::Pretty => Self::Pretty,
            LogFormatSetting::Compact => Self::Compact,
        }
    }
}

/// Initialize with custom configuration
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    // 1. Initialize Tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_log_level));

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    // 2. Initialize Prometheus Exporter (if enabled)
    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        "Observability initialized"
    );

    Ok(())
}

/// Initialize Prometheus only (tracing set up elsewhere)
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
