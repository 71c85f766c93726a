//! CaptureCoordinator - startup sequencing and run loop
//!
//! Drives one link through
//! `AwaitingConnection → AwaitingDiscovery → Provisioning → Armed → Running → Terminated`.
//! Every stage before `Running` is fatal on failure and can be interrupted by
//! the shutdown future.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use contracts::{
    CaptureDevice, CaptureOutcome, ConnectionDescriptor, ConnectionState, Geotagger, StorageProvisioner,
    SystemId, VehicleEventCallback,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, instrument, warn};
use vehicle_link::VehicleLink;

use crate::config::CoordinatorConfig;
use crate::error::{Result, StartupError};
use crate::position_cache::PositionCache;
use crate::router::{EventRouter, LinkStatus, TimedEvent};
use crate::sequence::SequenceCounter;
use crate::stats::{CaptureStats, CaptureStatsSnapshot};
use crate::worker::{CaptureWorker, WorkerContext, WorkerSettings};

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    AwaitingConnection,
    AwaitingDiscovery,
    Provisioning,
    Armed,
    Running,
    Terminated,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingConnection => "awaiting_connection",
            Self::AwaitingDiscovery => "awaiting_discovery",
            Self::Provisioning => "provisioning",
            Self::Armed => "armed",
            Self::Running => "running",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a completed run leaves behind
#[derive(Debug, Clone)]
pub struct RunReport {
    pub storage_root: PathBuf,
    pub system_id: SystemId,
    /// Next identifier that would have been used
    pub final_sequence: u64,
    pub stats: CaptureStatsSnapshot,
}

/// Capture-and-geotag coordinator
pub struct CaptureCoordinator<L, C, G, S> {
    link: L,
    camera: C,
    geotagger: G,
    provisioner: S,
    config: CoordinatorConfig,
    cache: Arc<PositionCache>,
    counter: Arc<SequenceCounter>,
    stats: Arc<CaptureStats>,
    state_tx: watch::Sender<CoordinatorState>,
    outcomes_tx: broadcast::Sender<CaptureOutcome>,
}

impl<L, C, G, S> CaptureCoordinator<L, C, G, S>
where
    L: VehicleLink,
    C: CaptureDevice + Send + Sync + 'static,
    G: Geotagger + Send + Sync + 'static,
    S: StorageProvisioner + Send + Sync,
{
    pub fn new(link: L, camera: C, geotagger: G, provisioner: S, config: CoordinatorConfig) -> Self {
        let (state_tx, _) = watch::channel(CoordinatorState::AwaitingConnection);
        let (outcomes_tx, _) = broadcast::channel(config.outcome_capacity.max(1));
        Self {
            link,
            camera,
            geotagger,
            provisioner,
            config,
            cache: Arc::new(PositionCache::new()),
            counter: Arc::new(SequenceCounter::new()),
            stats: Arc::new(CaptureStats::new()),
            state_tx,
            outcomes_tx,
        }
    }

    /// Use an existing position cache and counter
    pub fn with_shared_state(mut self, cache: Arc<PositionCache>, counter: Arc<SequenceCounter>) -> Self {
        self.cache = cache;
        self.counter = counter;
        self
    }

    /// Lifecycle updates
    pub fn state(&self) -> watch::Receiver<CoordinatorState> {
        self.state_tx.subscribe()
    }

    /// One outcome per handled trigger
    pub fn outcomes(&self) -> broadcast::Receiver<CaptureOutcome> {
        self.outcomes_tx.subscribe()
    }

    pub fn position_cache(&self) -> Arc<PositionCache> {
        self.cache.clone()
    }

    pub fn sequence(&self) -> Arc<SequenceCounter> {
        self.counter.clone()
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        self.stats.clone()
    }

    /// Run until `shutdown` completes
    ///
    /// # Errors
    /// Returns the first fatal startup failure, or `Interrupted` when
    /// `shutdown` completes before capture handling is armed.
    #[instrument(
        name = "capture_coordinator_run",
        skip(self, shutdown),
        fields(descriptor = %descriptor, link = self.link.name())
    )]
    pub async fn run<F>(mut self, descriptor: &ConnectionDescriptor, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()> + Send,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        self.set_state(CoordinatorState::AwaitingConnection);
        match or_shutdown(&mut shutdown, self.link.connect(descriptor)).await {
            Ok(Ok(())) => info!("vehicle link connected"),
            Ok(Err(e)) => return Err(self.fail(None, StartupError::Connection(e)).await),
            Err(interrupted) => return Err(self.fail(None, interrupted).await),
        }

        self.set_state(CoordinatorState::AwaitingDiscovery);
        let (status_tx, mut status_rx) = watch::channel(LinkStatus {
            state: ConnectionState::Connected,
            system_id: None,
        });
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let router = EventRouter::spawn(events_rx, status_tx, self.cache.clone(), self.stats.clone());

        let callback: VehicleEventCallback = Arc::new(move |event| {
            // Router gone means we are shutting down
            let _ = events_tx.send(TimedEvent::now(event));
        });
        self.link.listen(callback);

        let (system_id, storage_root) = match self.start(&mut shutdown, &mut status_rx).await {
            Ok(started) => started,
            Err(e) => return Err(self.fail(Some(router), e).await),
        };

        self.set_state(CoordinatorState::Armed);
        let worker = CaptureWorker::spawn(
            self.camera,
            self.geotagger,
            storage_root.clone(),
            WorkerSettings {
                capture_timeout: self.config.capture_timeout,
                geotag_enabled: self.config.geotag_enabled,
                stale_position_after: self.config.stale_position_after,
            },
            WorkerContext {
                counter: self.counter.clone(),
                stats: self.stats.clone(),
                outcomes: self.outcomes_tx.clone(),
            },
        );
        router.arm(worker.queue());

        let _ = self.state_tx.send(CoordinatorState::Running);
        info!(
            system_id,
            storage_root = %storage_root.display(),
            state = %CoordinatorState::Running,
            "waiting for capture triggers"
        );
        shutdown.await;

        info!("shutdown requested, finishing queued captures");
        self.link.stop();
        router.stop().await;
        worker.shutdown().await;

        let report = RunReport {
            storage_root,
            system_id,
            final_sequence: self.counter.current(),
            stats: self.stats.snapshot(),
        };
        info!(state = %CoordinatorState::Terminated, "coordinator state");
        let _ = self.state_tx.send(CoordinatorState::Terminated);
        Ok(report)
    }

    /// Discovery and provisioning
    async fn start<F>(
        &self,
        shutdown: &mut Pin<&mut F>,
        status: &mut watch::Receiver<LinkStatus>,
    ) -> Result<(SystemId, PathBuf)>
    where
        F: Future<Output = ()>,
    {
        let timeout = self.config.discovery_timeout;
        let discovery = async {
            status
                .wait_for(LinkStatus::is_discovered)
                .await
                .ok()
                .and_then(|status| status.system_id)
        };
        let system_id = or_shutdown(shutdown, tokio::time::timeout(timeout, discovery))
            .await?
            .ok()
            .flatten()
            .ok_or(StartupError::DiscoveryTimeout { timeout })?;

        self.set_state(CoordinatorState::Provisioning);
        let rate_hz = self.config.position_rate_hz;
        or_shutdown(shutdown, self.link.set_position_rate(rate_hz))
            .await?
            .map_err(StartupError::PositionRate)?;
        info!(rate_hz, "position telemetry requested");

        or_shutdown(shutdown, tokio::time::sleep(self.config.initial_telemetry_delay)).await?;
        match self.cache.latest() {
            Some(fix) => info!(
                lat = fix.position.latitude_deg,
                lon = fix.position.longitude_deg,
                alt = fix.position.relative_altitude_m,
                "initial position"
            ),
            None => warn!("no telemetry yet, captures will use zero position until it arrives"),
        }

        let storage_root = or_shutdown(shutdown, self.provisioner.provision())
            .await?
            .map_err(StartupError::Storage)?;
        info!(storage_root = %storage_root.display(), "storage provisioned");

        Ok((system_id, storage_root))
    }

    /// Tear down after a startup failure
    async fn fail(&self, router: Option<EventRouter>, error: StartupError) -> StartupError {
        if error.is_interrupted() {
            warn!("shutdown requested during startup");
        } else {
            error!(error = %error, "startup failed");
        }
        self.link.stop();
        if let Some(router) = router {
            router.stop().await;
        }
        self.set_state(CoordinatorState::Terminated);
        error
    }

    fn set_state(&self, state: CoordinatorState) {
        info!(state = %state, "coordinator state");
        let _ = self.state_tx.send(state);
    }
}

/// Await `future` unless shutdown completes first
async fn or_shutdown<F, T>(shutdown: &mut Pin<&mut F>, future: impl Future<Output = T>) -> Result<T>
where
    F: Future<Output = ()>,
{
    tokio::select! {
        value = future => Ok(value),
        _ = shutdown.as_mut() => Err(StartupError::Interrupted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{CaptureStatus, ContractError, Position, TriggerSource, VehicleEvent};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use vehicle_link::{MockDiscovery, MockLinkConfig, MockLinkHandle, MockVehicleLink};

    #[derive(Default)]
    struct Observed {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        tags: Mutex<Vec<(PathBuf, Position)>>,
        provisioned: AtomicUsize,
    }

    #[derive(Clone)]
    struct FakeCamera {
        observed: Arc<Observed>,
        fail_on: Option<&'static str>,
        delay: Duration,
    }

    impl CaptureDevice for FakeCamera {
        fn name(&self) -> &str {
            "fake"
        }

        async fn capture(&self, dir: &Path, identifier: &str) -> std::result::Result<PathBuf, ContractError> {
            let now = self.observed.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.observed.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.observed.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on == Some(identifier) {
                return Err(ContractError::capture(identifier, "shutter jammed"));
            }
            let path = dir.join(format!("{identifier}.jpg"));
            std::fs::write(&path, b"jpeg")?;
            Ok(path)
        }
    }

    struct FakeTagger(Arc<Observed>);

    impl Geotagger for FakeTagger {
        fn name(&self) -> &str {
            "fake"
        }

        async fn tag(&self, path: &Path, position: &Position) -> std::result::Result<(), ContractError> {
            self.0.tags.lock().unwrap().push((path.to_path_buf(), *position));
            Ok(())
        }
    }

    struct FakeStorage {
        root: Option<PathBuf>,
        observed: Arc<Observed>,
    }

    impl StorageProvisioner for FakeStorage {
        async fn provision(&self) -> std::result::Result<PathBuf, ContractError> {
            self.observed.provisioned.fetch_add(1, Ordering::SeqCst);
            self.root
                .clone()
                .ok_or_else(|| ContractError::storage("no media inserted"))
        }
    }

    type TestCoordinator = CaptureCoordinator<MockVehicleLink, FakeCamera, FakeTagger, FakeStorage>;

    struct Harness {
        dir: tempfile::TempDir,
        observed: Arc<Observed>,
        handle: MockLinkHandle,
        coordinator: TestCoordinator,
    }

    fn fast_config() -> CoordinatorConfig {
        CoordinatorConfig {
            discovery_timeout: Duration::from_millis(500),
            initial_telemetry_delay: Duration::from_millis(20),
            ..CoordinatorConfig::default()
        }
    }

    fn harness(link_config: MockLinkConfig, fail_on: Option<&'static str>, with_storage: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let observed = Arc::new(Observed::default());
        let link = MockVehicleLink::new(link_config);
        let handle = link.handle();
        let camera = FakeCamera {
            observed: observed.clone(),
            fail_on,
            delay: Duration::from_millis(10),
        };
        let storage = FakeStorage {
            root: with_storage.then(|| dir.path().to_path_buf()),
            observed: observed.clone(),
        };
        let coordinator =
            CaptureCoordinator::new(link, camera, FakeTagger(observed.clone()), storage, fast_config());
        Harness {
            dir,
            observed,
            handle,
            coordinator,
        }
    }

    fn descriptor() -> ConnectionDescriptor {
        "udp://:14540".parse().unwrap()
    }

    /// Spawn the run and wait until triggers are handled
    async fn start_running(
        coordinator: TestCoordinator,
    ) -> (oneshot::Sender<()>, JoinHandle<Result<RunReport>>) {
        let mut state = coordinator.state();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
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
        .unwrap()
        .unwrap();
        (stop_tx, run)
    }

    async fn next_outcome(rx: &mut broadcast::Receiver<CaptureOutcome>) -> CaptureOutcome {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connection_failure_is_fatal() {
        let h = harness(
            MockLinkConfig {
                fail_connect: true,
                ..Default::default()
            },
            None,
            true,
        );
        let err = h.coordinator.run(&descriptor(), std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, StartupError::Connection(_)));
    }

    #[tokio::test]
    async fn test_discovery_timeout_is_fatal() {
        let h = harness(
            MockLinkConfig {
                discovery: MockDiscovery::Never,
                ..Default::default()
            },
            None,
            true,
        );
        let mut state = h.coordinator.state();
        let err = h.coordinator.run(&descriptor(), std::future::pending::<()>()).await.unwrap_err();

        assert!(matches!(err, StartupError::DiscoveryTimeout { .. }));
        assert_eq!(*state.borrow_and_update(), CoordinatorState::Terminated);
        assert_eq!(h.observed.provisioned.load(Ordering::SeqCst), 0);
        assert_eq!(std::fs::read_dir(h.dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rate_rejection_is_fatal() {
        let h = harness(
            MockLinkConfig {
                reject_position_rate: true,
                ..Default::default()
            },
            None,
            true,
        );
        let err = h.coordinator.run(&descriptor(), std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, StartupError::PositionRate(_)));
        assert_eq!(h.observed.provisioned.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_is_fatal() {
        let h = harness(MockLinkConfig::default(), None, false);
        let err = h.coordinator.run(&descriptor(), std::future::pending::<()>()).await.unwrap_err();
        assert!(matches!(err, StartupError::Storage(_)));
    }

    #[tokio::test]
    async fn test_shutdown_during_discovery() {
        let h = harness(
            MockLinkConfig {
                discovery: MockDiscovery::Never,
                ..Default::default()
            },
            None,
            true,
        );
        let err = h
            .coordinator
            .run(&descriptor(), tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn test_trigger_tagged_with_latest_position() {
        let h = harness(MockLinkConfig::default(), None, true);
        let mut outcomes = h.coordinator.outcomes();
        let (stop, run) = start_running(h.coordinator).await;

        h.handle.position(1, Position::new(-23.55, -46.63, 120.4));
        h.handle.trigger();
        let outcome = next_outcome(&mut outcomes).await;

        assert_eq!(outcome.sequence, 0);
        assert_eq!(outcome.status, CaptureStatus::Tagged);
        assert!(outcome.position_known);
        assert_eq!(outcome.image_path, Some(h.dir.path().join("0.jpg")));
        assert_eq!(
            h.observed.tags.lock().unwrap()[0].1,
            Position::new(-23.55, -46.63, 120.4)
        );

        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.final_sequence, 1);
        assert_eq!(report.system_id, 1);
        assert_eq!(report.storage_root, h.dir.path());
    }

    #[tokio::test]
    async fn test_shared_state_continues_numbering() {
        let mut h = harness(MockLinkConfig::default(), None, true);
        let cache = Arc::new(PositionCache::new());
        cache.update(Position::new(47.39, 8.54, 30.0));
        let counter = Arc::new(SequenceCounter::new());
        for _ in 0..5 {
            counter.advance();
        }
        h.coordinator = h.coordinator.with_shared_state(cache.clone(), counter.clone());
        assert!(Arc::ptr_eq(&h.coordinator.position_cache(), &cache));

        let mut outcomes = h.coordinator.outcomes();
        let (stop, run) = start_running(h.coordinator).await;

        h.handle.trigger();
        let outcome = next_outcome(&mut outcomes).await;
        assert_eq!(outcome.sequence, 5);
        assert_eq!(outcome.image_path, Some(h.dir.path().join("5.jpg")));
        assert_eq!(outcome.position, Position::new(47.39, 8.54, 30.0));

        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.final_sequence, 6);
        assert_eq!(counter.current(), 6);
    }

    #[tokio::test]
    async fn test_trigger_before_telemetry_uses_sentinel() {
        let h = harness(MockLinkConfig::default(), None, true);
        let mut outcomes = h.coordinator.outcomes();
        let (stop, run) = start_running(h.coordinator).await;

        h.handle.trigger();
        let outcome = next_outcome(&mut outcomes).await;
        assert!(!outcome.position_known);
        assert_eq!(outcome.position, Position::UNKNOWN);
        assert_eq!(h.observed.tags.lock().unwrap()[0].1, Position::UNKNOWN);

        stop.send(()).unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_trigger_during_startup_is_ignored() {
        let h = harness(MockLinkConfig::default(), None, true);
        // delivered as soon as the coordinator starts listening
        h.handle.trigger();
        let (stop, run) = start_running(h.coordinator).await;

        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.stats.triggers_ignored, 1);
        assert_eq!(report.final_sequence, 0);
        assert_eq!(std::fs::read_dir(h.dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_capture_advances_counter() {
        let h = harness(MockLinkConfig::default(), Some("0"), true);
        let mut outcomes = h.coordinator.outcomes();
        let (stop, run) = start_running(h.coordinator).await;

        h.handle.trigger();
        h.handle.trigger();
        let first = next_outcome(&mut outcomes).await;
        let second = next_outcome(&mut outcomes).await;

        assert!(matches!(first.status, CaptureStatus::CaptureFailed(_)));
        assert_eq!(second.sequence, 1);
        assert_eq!(second.status, CaptureStatus::Tagged);
        assert!(!h.dir.path().join("0.jpg").exists());
        assert!(h.dir.path().join("1.jpg").exists());

        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.final_sequence, 2);
        assert_eq!(report.stats.capture_failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_never_overlap() {
        const TRIGGERS: usize = 16;
        let h = harness(MockLinkConfig::default(), None, true);
        let mut outcomes = h.coordinator.outcomes();
        let (stop, run) = start_running(h.coordinator).await;

        let threads: Vec<_> = (0..TRIGGERS)
            .map(|i| {
                let handle = h.handle.clone();
                std::thread::spawn(move || {
                    handle.emit(VehicleEvent::CaptureTriggered {
                        source: TriggerSource::CameraTrigger { seq: i as u32 },
                    })
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let mut sequences = Vec::new();
        for _ in 0..TRIGGERS {
            sequences.push(next_outcome(&mut outcomes).await.sequence);
        }
        assert_eq!(sequences, (0..TRIGGERS as u64).collect::<Vec<_>>());
        assert_eq!(h.observed.max_in_flight.load(Ordering::SeqCst), 1);

        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();
        assert_eq!(report.final_sequence, TRIGGERS as u64);
        assert_eq!(report.stats.images_tagged, TRIGGERS as u64);
    }

    #[tokio::test]
    async fn test_queued_triggers_finish_on_shutdown() {
        let h = harness(MockLinkConfig::default(), None, true);
        let (stop, run) = start_running(h.coordinator).await;

        for _ in 0..3 {
            h.handle.trigger();
        }
        // let the router pick them up before stopping
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();
        let report = run.await.unwrap().unwrap();

        assert_eq!(report.final_sequence, 3);
        assert_eq!(report.stats.handled(), 3);
    }
}
