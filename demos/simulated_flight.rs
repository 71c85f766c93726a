//! Simulated Flight Demo
//!
//! Flies a simulated vehicle along a straight line, triggers the camera a few
//! times and writes geotagged synthetic frames. No autopilot or camera needed.
//!
//! Run with: cargo run -p pixtrigger_demos --bin simulated_flight [output_dir] [config.toml]

use std::path::PathBuf;
use std::time::Duration;

use capture::{DirectoryProvisioner, ExifGeotagger, SyntheticCamera};
use config_loader::ConfigLoader;
use contracts::{ConnectionDescriptor, Position, TriggerSource, VehicleEvent};
use coordinator::{CaptureCoordinator, CoordinatorConfig, CoordinatorState};
use observability::CaptureSummaryAggregator;
use tokio::sync::oneshot;
use vehicle_link::{MockDiscovery, MockLinkConfig, MockTelemetry, MockVehicleLink};

const TRIGGERS: u32 = 5;
const TRIGGER_INTERVAL: Duration = Duration::from_millis(400);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Starting Simulated Flight Demo");

    // ==== Stage 1: Configuration ====
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("./demo-captures"));
    let agent = match std::env::args().nth(2) {
        Some(path) => {
            tracing::info!(path = %path, "Loading agent config");
            ConfigLoader::load_from_path(std::path::Path::new(&path))?
        }
        None => ConfigLoader::load_or_default(None)?,
    };
    let config = CoordinatorConfig {
        initial_telemetry_delay: Duration::from_millis(300),
        ..CoordinatorConfig::from(&agent)
    };

    // ==== Stage 2: Simulated vehicle ====
    let link = MockVehicleLink::new(MockLinkConfig {
        discovery: MockDiscovery::After(Duration::from_millis(150)),
        telemetry: Some(MockTelemetry {
            origin: Position::new(-23.55, -46.63, 120.4),
            step_deg: 0.0001,
        }),
        ..Default::default()
    });
    let vehicle = link.handle();

    // ==== Stage 3: Coordinator ====
    let coordinator = CaptureCoordinator::new(
        link,
        SyntheticCamera::new(640, 480),
        ExifGeotagger::new(),
        DirectoryProvisioner::new(&output_dir, Some(agent.storage.session_format.clone())),
        config,
    );
    let mut state = coordinator.state();
    let mut outcomes = coordinator.outcomes();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let descriptor: ConnectionDescriptor = "udp://:14540".parse()?;
    let run = tokio::spawn(async move {
        coordinator
            .run(&descriptor, async move {
                let _ = stop_rx.await;
            })
            .await
    });

    state
        .wait_for(|s| *s == CoordinatorState::Running)
        .await?;
    tracing::info!("Vehicle armed, starting survey line");

    // ==== Stage 4: Fly and trigger ====
    let mut aggregator = CaptureSummaryAggregator::new();
    for seq in 0..TRIGGERS {
        tokio::time::sleep(TRIGGER_INTERVAL).await;
        vehicle.emit(VehicleEvent::CaptureTriggered {
            source: TriggerSource::CameraTrigger { seq },
        });

        let outcome = outcomes.recv().await?;
        tracing::info!(
            sequence = outcome.sequence,
            status = outcome.status.label(),
            lat = outcome.position.latitude_deg,
            lon = outcome.position.longitude_deg,
            "Frame handled"
        );
        aggregator.update(&outcome);
    }

    // ==== Stage 5: Land ====
    let _ = stop_tx.send(());
    let report = run.await??;

    println!("{}", aggregator.summary());
    println!("Images written to {}", report.storage_root.display());
    Ok(())
}
