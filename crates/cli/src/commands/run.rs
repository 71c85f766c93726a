//! Agent run command.
//!
//! Uses the MAVLink link when the `mavlink` feature is enabled, otherwise
//! flies a simulated vehicle that triggers the camera periodically.

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use capture::{ConfiguredCamera, ConfiguredProvisioner, ExifGeotagger};
use config_loader::ConfigLoader;
use contracts::{AgentConfig, CameraKind, CaptureOutcome, ConnectionDescriptor, StorageKind};
use coordinator::{CaptureCoordinator, CoordinatorConfig, RunReport};
use observability::{CaptureSummaryAggregator, ObservabilityConfig};
use vehicle_link::VehicleLink;

use crate::cli::Cli;

/// Load the configuration file (or defaults) and apply command-line overrides
pub fn load_config(cli: &Cli) -> Result<AgentConfig> {
    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }
    }

    let mut config = ConfigLoader::load_or_default(cli.config.as_deref())
        .context("Failed to load configuration")?;
    apply_overrides(&mut config, cli);
    ConfigLoader::validate(&config).context("Invalid command-line override")?;
    Ok(config)
}

fn apply_overrides(config: &mut AgentConfig, cli: &Cli) {
    if let Some(timeout_ms) = cli.discovery_timeout_ms {
        config.link.discovery_timeout_ms = timeout_ms;
    }
    if let Some(dir) = &cli.storage_dir {
        config.storage.kind = StorageKind::Directory;
        config.storage.directory = dir.clone();
    }
    if cli.synthetic_camera {
        config.camera.kind = CameraKind::Synthetic;
    }
    if let Some(port) = cli.metrics_port {
        config.observability.metrics_port = Some(port);
    }
}

/// Logging setup: CLI flags win over the configuration file
pub fn observability_config(cli: &Cli, config: &AgentConfig) -> ObservabilityConfig {
    let mut observability = ObservabilityConfig::from(&config.observability);

    if let Some(format) = cli.log_format {
        observability.log_format = format.into();
    }
    observability.default_log_level = if cli.quiet {
        "warn".to_string()
    } else {
        match cli.verbose {
            0 => observability.default_log_level,
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    observability
}

/// Run the agent until Ctrl+C / SIGTERM
pub async fn run_agent(cli: &Cli, config: AgentConfig) -> Result<()> {
    let descriptor: ConnectionDescriptor = cli
        .descriptor
        .parse()
        .with_context(|| format!("Invalid connection descriptor '{}'", cli.descriptor))?;

    info!(
        descriptor = %descriptor,
        camera = ?config.camera.kind,
        storage = ?config.storage.kind,
        geotag = config.geotag.enabled,
        discovery_timeout_ms = config.link.discovery_timeout_ms,
        "Configuration loaded"
    );

    if cli.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&descriptor, &config)?;
        return Ok(());
    }

    #[cfg(feature = "mavlink")]
    {
        let link = vehicle_link::MavlinkVehicleLink::new((&config.link).into());
        return run_with_link(link, &descriptor, &config).await;
    }

    #[cfg(not(feature = "mavlink"))]
    {
        warn!("Built without MAVLink support, flying a simulated vehicle");
        let link = simulated_link();
        let triggers = spawn_simulated_triggers(link.handle(), SIMULATED_TRIGGER_INTERVAL);
        let result = run_with_link(link, &descriptor, &config).await;
        triggers.abort();
        return result;
    }
}

async fn run_with_link<L: VehicleLink>(
    link: L,
    descriptor: &ConnectionDescriptor,
    config: &AgentConfig,
) -> Result<()> {
    let coordinator = CaptureCoordinator::new(
        link,
        ConfiguredCamera::from_config(&config.camera),
        ExifGeotagger::new(),
        ConfiguredProvisioner::from_config(&config.storage),
        CoordinatorConfig::from(config),
    );
    let summary = tokio::spawn(collect_summary(coordinator.outcomes()));

    let result = coordinator.run(descriptor, setup_shutdown_signal()).await;

    // Coordinator dropped, outcome channel closed
    let aggregator = summary.await.context("Summary task failed")?;

    match result {
        Ok(report) => {
            info!(
                images = report.stats.images_captured,
                final_sequence = report.final_sequence,
                storage_root = %report.storage_root.display(),
                "PixTrigger stopped"
            );
            print_run_summary(&report, &aggregator);
            Ok(())
        }
        Err(e) if e.is_interrupted() => {
            warn!("Interrupted before startup completed");
            Ok(())
        }
        Err(e) => Err(e).context("Startup failed"),
    }
}

async fn collect_summary(mut outcomes: broadcast::Receiver<CaptureOutcome>) -> CaptureSummaryAggregator {
    let mut aggregator = CaptureSummaryAggregator::new();
    loop {
        match outcomes.recv().await {
            Ok(outcome) => aggregator.update(&outcome),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Summary fell behind, outcomes skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    aggregator
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(not(feature = "mavlink"))]
const SIMULATED_TRIGGER_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

#[cfg(not(feature = "mavlink"))]
fn simulated_link() -> vehicle_link::MockVehicleLink {
    use contracts::Position;
    use std::time::Duration;
    use vehicle_link::{MockDiscovery, MockLinkConfig, MockTelemetry, MockVehicleLink};

    MockVehicleLink::new(MockLinkConfig {
        discovery: MockDiscovery::After(Duration::from_millis(200)),
        telemetry: Some(MockTelemetry {
            origin: Position::new(47.397742, 8.545594, 25.0),
            step_deg: 0.00001,
        }),
        ..Default::default()
    })
}

#[cfg(not(feature = "mavlink"))]
fn spawn_simulated_triggers(
    handle: vehicle_link::MockLinkHandle,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // first tick fires immediately, before startup completes
        interval.tick().await;
        loop {
            interval.tick().await;
            handle.trigger();
        }
    })
}

/// Print configuration summary for dry-run mode
fn print_config_summary(descriptor: &ConnectionDescriptor, config: &AgentConfig) -> Result<()> {
    println!("\n=== Configuration Summary ===\n");
    println!("Vehicle:");
    println!("  Descriptor: {}", descriptor);
    println!(
        "  Discovery timeout: {} ms, position rate: {} Hz",
        config.link.discovery_timeout_ms, config.link.position_rate_hz
    );
    println!("\nCamera: {:?}", config.camera.kind);
    match config.camera.kind {
        CameraKind::Command => println!(
            "  Program: {} {}",
            config.camera.program,
            config.camera.args.join(" ")
        ),
        CameraKind::Synthetic => println!(
            "  Frame: {}x{} (quality {})",
            config.camera.width, config.camera.height, config.camera.jpeg_quality
        ),
    }
    println!("\nStorage: {:?}", config.storage.kind);
    match config.storage.kind {
        StorageKind::MountedMedia => println!("  Media root: {}", config.storage.media_root.display()),
        StorageKind::Directory => println!("  Directory: {}", config.storage.directory.display()),
    }
    println!("\nGeotag: {}", if config.geotag.enabled { "enabled" } else { "disabled" });

    println!("\n=== Effective Configuration (TOML) ===\n");
    println!("{}", ConfigLoader::to_toml(config)?);
    Ok(())
}

fn print_run_summary(report: &RunReport, aggregator: &CaptureSummaryAggregator) {
    println!();
    println!("{}", aggregator.summary());
    println!("Storage: {}", report.storage_root.display());
    println!("Vehicle system id: {}", report.system_id);
    println!("Next image identifier: {}", report.final_sequence);
    if report.stats.triggers_ignored > 0 {
        println!(
            "Triggers ignored during startup: {}",
            report.stats.triggers_ignored
        );
    }
    println!();
}
