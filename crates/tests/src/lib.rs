//! # Integration Tests
//!
//! Integration and end-to-end tests.
//!
//! Covers:
//! - Configuration to coordinator wiring
//! - Mock-vehicle e2e scenarios (no autopilot needed)
//! - Concurrency properties of the capture path

#[cfg(test)]
mod support {
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use capture::{DirectoryProvisioner, ExifGeotagger, SyntheticCamera};
    use contracts::{CaptureDevice, CaptureOutcome, ConnectionDescriptor, ContractError};
    use coordinator::{CaptureCoordinator, CoordinatorConfig, CoordinatorState, RunReport, StartupError};
    use tokio::sync::{broadcast, oneshot};
    use tokio::task::JoinHandle;
    use vehicle_link::{MockLinkConfig, MockLinkHandle, MockVehicleLink};

    /// Synthetic camera that fails the first `failures` captures
    #[derive(Clone)]
    pub struct FlakyCamera {
        inner: SyntheticCamera,
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl FlakyCamera {
        pub fn new(failures: usize) -> Self {
            Self {
                inner: SyntheticCamera::new(64, 48),
                failures,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl CaptureDevice for FlakyCamera {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn capture(&self, dir: &Path, identifier: &str) -> Result<PathBuf, ContractError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(ContractError::capture(identifier, "camera not ready"));
            }
            self.inner.capture(dir, identifier).await
        }
    }

    pub type Rig = CaptureCoordinator<MockVehicleLink, FlakyCamera, ExifGeotagger, DirectoryProvisioner>;

    pub fn test_config() -> CoordinatorConfig {
        CoordinatorConfig {
            discovery_timeout: Duration::from_millis(500),
            initial_telemetry_delay: Duration::from_millis(20),
            ..CoordinatorConfig::default()
        }
    }

    pub fn rig(dir: &Path, link: MockLinkConfig, camera_failures: usize) -> (Rig, MockLinkHandle) {
        let link = MockVehicleLink::new(link);
        let handle = link.handle();
        let coordinator = CaptureCoordinator::new(
            link,
            FlakyCamera::new(camera_failures),
            ExifGeotagger::new(),
            DirectoryProvisioner::new(dir, None),
            test_config(),
        );
        (coordinator, handle)
    }

    pub fn descriptor() -> ConnectionDescriptor {
        "udp://:14540".parse().unwrap()
    }

    pub struct Running {
        pub stop: oneshot::Sender<()>,
        pub run: JoinHandle<Result<RunReport, StartupError>>,
        pub outcomes: broadcast::Receiver<CaptureOutcome>,
    }

    impl Running {
        pub async fn next_outcome(&mut self) -> CaptureOutcome {
            tokio::time::timeout(Duration::from_secs(10), self.outcomes.recv())
                .await
                .expect("outcome timed out")
                .expect("outcome channel closed")
        }

        pub async fn finish(self) -> RunReport {
            self.stop.send(()).unwrap();
            self.run.await.unwrap().unwrap()
        }
    }

    /// Run the coordinator in the background until it reports `Running`
    pub async fn start(coordinator: Rig) -> Running {
        let mut state = coordinator.state();
        let outcomes = coordinator.outcomes();
        let (stop, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            coordinator
                .run(&descriptor(), async move {
                    let _ = stop_rx.await;
                })
                .await
        });
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == CoordinatorState::Running),
        )
        .await
        .expect("coordinator never reached running")
        .unwrap();
        Running { stop, run, outcomes }
    }

    /// Latitude, longitude, altitude read back from the image's EXIF block
    pub fn read_gps(path: &Path) -> (f64, f64, f64) {
        let file = File::open(path).unwrap();
        let exif = exif::Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .unwrap();

        let degrees = |tag: exif::Tag, ref_tag: exif::Tag| {
            let field = exif.get_field(tag, exif::In::PRIMARY).unwrap();
            let exif::Value::Rational(ref parts) = field.value else {
                panic!("{tag} is not rational");
            };
            let value: f64 = parts
                .iter()
                .zip([1.0, 60.0, 3600.0])
                .map(|(r, div)| r.to_f64() / div)
                .sum();
            let reference = exif
                .get_field(ref_tag, exif::In::PRIMARY)
                .unwrap()
                .display_value()
                .to_string();
            if reference.contains('S') || reference.contains('W') {
                -value
            } else {
                value
            }
        };

        let altitude = exif.get_field(exif::Tag::GPSAltitude, exif::In::PRIMARY).unwrap();
        let exif::Value::Rational(ref alt) = altitude.value else {
            panic!("altitude is not rational");
        };

        (
            degrees(exif::Tag::GPSLatitude, exif::Tag::GPSLatitudeRef),
            degrees(exif::Tag::GPSLongitude, exif::Tag::GPSLongitudeRef),
            alt[0].to_f64(),
        )
    }

    pub fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    pub fn image_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".jpg"))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod config_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use coordinator::CoordinatorConfig;

    #[test]
    fn test_toml_reaches_coordinator() {
        let toml = r#"
            [link]
            discovery_timeout_ms = 4000
            position_rate_hz = 2.0

            [camera]
            capture_timeout_ms = 3000

            [geotag]
            enabled = false
            stale_position_after_ms = 1500
        "#;
        let agent = ConfigLoader::load_from_str(toml, ConfigFormat::Toml).unwrap();
        let config = CoordinatorConfig::from(&agent);

        assert_eq!(config.discovery_timeout, Duration::from_secs(4));
        assert_eq!(config.position_rate_hz, 2.0);
        assert_eq!(config.capture_timeout, Duration::from_secs(3));
        assert_eq!(config.stale_position_after, Duration::from_millis(1500));
        assert!(!config.geotag_enabled);
    }

    #[test]
    fn test_empty_file_uses_reference_timing() {
        let agent = ConfigLoader::load_from_str("", ConfigFormat::Toml).unwrap();
        let config = CoordinatorConfig::from(&agent);
        assert_eq!(config.discovery_timeout, Duration::from_secs(2));
        assert_eq!(config.initial_telemetry_delay, Duration::from_secs(1));
        assert_eq!(config.position_rate_hz, 1.0);
    }
}

#[cfg(test)]
mod e2e_tests {
    use contracts::{CaptureStatus, Position};
    use coordinator::StartupError;
    use observability::CaptureSummaryAggregator;
    use vehicle_link::{MockDiscovery, MockLinkConfig};

    use crate::support::*;

    /// Discovery, telemetry, one trigger: image `0` tagged with the position
    #[tokio::test]
    async fn test_single_trigger_geotagged() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(dir.path(), MockLinkConfig::default(), 0);
        let mut running = start(coordinator).await;

        handle.position(1, Position::new(-23.55, -46.63, 120.4));
        handle.trigger();
        let outcome = running.next_outcome().await;

        assert_eq!(outcome.sequence, 0);
        assert_eq!(outcome.status, CaptureStatus::Tagged);
        let path = outcome.image_path.clone().unwrap();
        assert_eq!(path.file_name().unwrap(), "0.jpg");

        let (lat, lon, alt) = read_gps(&path);
        assert_close(lat, -23.55);
        assert_close(lon, -46.63);
        assert_close(alt, 120.4);

        let report = running.finish().await;
        assert_eq!(report.final_sequence, 1);
        assert_eq!(image_files(&report.storage_root), vec!["0.jpg"]);
    }

    /// No system within the discovery window: fatal, nothing written
    #[tokio::test]
    async fn test_discovery_timeout_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(
            dir.path(),
            MockLinkConfig {
                discovery: MockDiscovery::Never,
                ..Default::default()
            },
            0,
        );
        // triggers are irrelevant before discovery
        handle.trigger();

        let err = coordinator
            .run(&descriptor(), std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(matches!(err, StartupError::DiscoveryTimeout { .. }));
        assert!(!err.is_interrupted());
        assert!(image_files(dir.path()).is_empty());
    }

    /// Back-to-back triggers run serially as `0` then `1`
    #[tokio::test]
    async fn test_back_to_back_triggers() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(dir.path(), MockLinkConfig::default(), 0);
        let mut running = start(coordinator).await;

        handle.position(1, Position::new(52.52, 13.405, 30.0));
        handle.trigger();
        handle.trigger();

        let first = running.next_outcome().await;
        let second = running.next_outcome().await;
        assert_eq!((first.sequence, second.sequence), (0, 1));
        assert!(first.duration > std::time::Duration::ZERO);

        let report = running.finish().await;
        assert_eq!(image_files(&report.storage_root), vec!["0.jpg", "1.jpg"]);
        assert_eq!(report.final_sequence, 2);
    }

    /// A failed capture leaves no image but still consumes its identifier
    #[tokio::test]
    async fn test_capture_failure_then_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(dir.path(), MockLinkConfig::default(), 1);
        let mut running = start(coordinator).await;

        handle.trigger();
        handle.trigger();

        let failed = running.next_outcome().await;
        assert!(matches!(failed.status, CaptureStatus::CaptureFailed(_)));
        assert!(failed.image_path.is_none());

        let recovered = running.next_outcome().await;
        assert_eq!(recovered.sequence, 1);
        assert_eq!(recovered.status, CaptureStatus::Tagged);

        let mut aggregator = CaptureSummaryAggregator::new();
        aggregator.update(&failed);
        aggregator.update(&recovered);
        let summary = aggregator.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.capture_failed, 1);

        let report = running.finish().await;
        assert_eq!(report.final_sequence, 2);
        assert_eq!(image_files(&report.storage_root), vec!["1.jpg"]);
    }

    /// Position telemetry streamed by the link reaches the images
    #[tokio::test]
    async fn test_streamed_telemetry_used() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Position::new(47.397742, 8.545594, 25.0);
        let (coordinator, handle) = rig(
            dir.path(),
            MockLinkConfig {
                telemetry: Some(vehicle_link::MockTelemetry {
                    origin,
                    step_deg: 0.0,
                }),
                ..Default::default()
            },
            0,
        );
        let mut running = start(coordinator).await;

        handle.trigger();
        let outcome = running.next_outcome().await;
        assert!(outcome.position_known);

        let (lat, lon, alt) = read_gps(outcome.image_path.as_ref().unwrap());
        assert_close(lat, origin.latitude_deg);
        assert_close(lon, origin.longitude_deg);
        assert_close(alt, origin.relative_altitude_m);

        running.finish().await;
    }
}

#[cfg(test)]
mod property_tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    use contracts::{Position, TriggerSource, VehicleEvent};
    use coordinator::{PositionCache, SequenceCounter};
    use vehicle_link::MockLinkConfig;

    use crate::support::*;

    /// Readers only ever see samples that were written whole
    #[test]
    fn test_position_reads_are_atomic() {
        let cache = Arc::new(PositionCache::new());
        let writers: Vec<_> = (1..=4)
            .map(|w| {
                let cache = cache.clone();
                thread::spawn(move || {
                    for i in 0..2000 {
                        let v = (w * 10_000 + i) as f64;
                        cache.update(Position::new(v, v, v));
                    }
                })
            })
            .collect();

        for _ in 0..5000 {
            let p = cache.read();
            assert_eq!(p.latitude_deg, p.longitude_deg);
            assert_eq!(p.longitude_deg, p.relative_altitude_m);
        }
        for writer in writers {
            writer.join().unwrap();
        }
    }

    /// The counter hands out every value once, in order
    #[test]
    fn test_counter_never_skips() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || (0..100).map(|_| counter.advance()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = BTreeSet::new();
        for handle in handles {
            let values = handle.join().unwrap();
            assert!(values.windows(2).all(|w| w[0] < w[1]));
            seen.extend(values);
        }
        assert_eq!(seen, (1..=800).collect::<BTreeSet<u64>>());
        assert_eq!(counter.current(), 800);
    }

    /// N triggers from N threads: N images, N distinct sequences, counter +N
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_are_serialized() {
        const N: u32 = 12;
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(dir.path(), MockLinkConfig::default(), 0);
        let mut running = start(coordinator).await;

        let threads: Vec<_> = (0..N)
            .map(|seq| {
                let handle = handle.clone();
                thread::spawn(move || {
                    handle.emit(VehicleEvent::CaptureTriggered {
                        source: TriggerSource::CameraTrigger { seq },
                    });
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut sequences = Vec::new();
        let mut sources = BTreeSet::new();
        for _ in 0..N {
            let outcome = running.next_outcome().await;
            sequences.push(outcome.sequence);
            sources.insert(outcome.source.to_string());
        }
        assert_eq!(sequences, (0..N as u64).collect::<Vec<_>>());
        assert_eq!(sources.len(), N as usize);

        let report = running.finish().await;
        assert_eq!(report.final_sequence, N as u64);
        assert_eq!(image_files(&report.storage_root).len(), N as usize);
    }

    /// A trigger before any telemetry still produces an image, tagged with zeros
    #[tokio::test]
    async fn test_trigger_before_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let (coordinator, handle) = rig(dir.path(), MockLinkConfig::default(), 0);
        let mut running = start(coordinator).await;

        handle.trigger();
        let outcome = running.next_outcome().await;
        assert!(!outcome.position_known);
        assert!(outcome.position_age.is_none());

        let (lat, lon, alt) = read_gps(outcome.image_path.as_ref().unwrap());
        assert_eq!((lat, lon, alt), (0.0, 0.0, 0.0));

        running.finish().await;
    }
}
