//! Mock vehicle link
//!
//! Implements `VehicleLink` without any transport. Discovery is simulated on
//! a background thread, position telemetry can be generated at the requested
//! rate, and arbitrary events can be injected through a [`MockLinkHandle`].
//! Used for testing and for flying without an autopilot attached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use contracts::{
    ComponentKind, ConnectionDescriptor, Position, SystemId, TriggerSource, VehicleEvent,
    VehicleEventCallback,
};
use tracing::{debug, instrument, trace};

use crate::error::{LinkError, Result};
use crate::link::VehicleLink;

/// When the simulated vehicle shows up
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockDiscovery {
    /// Discovered this long after `listen`
    After(Duration),
    /// Never discovered
    Never,
}

/// Generated position telemetry
#[derive(Debug, Clone, Copy)]
pub struct MockTelemetry {
    /// First reported position
    pub origin: Position,
    /// Latitude/longitude increment per sample (degrees)
    pub step_deg: f64,
}

/// Mock link configuration (failure injection)
#[derive(Debug, Clone)]
pub struct MockLinkConfig {
    /// `connect` fails
    pub fail_connect: bool,
    /// `set_position_rate` fails
    pub reject_position_rate: bool,
    pub discovery: MockDiscovery,
    /// System id reported on discovery
    pub system_id: SystemId,
    /// Stream positions once a rate is requested (None = silent)
    pub telemetry: Option<MockTelemetry>,
}

impl Default for MockLinkConfig {
    fn default() -> Self {
        Self {
            fail_connect: false,
            reject_position_rate: false,
            discovery: MockDiscovery::After(Duration::from_millis(10)),
            system_id: 1,
            telemetry: None,
        }
    }
}

#[derive(Default)]
struct MockState {
    callback: Option<VehicleEventCallback>,
    /// Events injected before `listen`
    pending: Vec<VehicleEvent>,
    stopped: bool,
}

#[derive(Default)]
struct MockShared {
    state: Mutex<MockState>,
    listening: AtomicBool,
    connected: AtomicBool,
    streaming: AtomicBool,
    requested_rate: Mutex<Option<f64>>,
    descriptor: Mutex<Option<ConnectionDescriptor>>,
}

impl MockShared {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Deliver in injection order; buffered until `listen`, dropped after `stop`
    fn deliver(&self, event: VehicleEvent) {
        let mut state = self.state();
        if state.stopped {
            trace!(kind = event.kind(), "mock link stopped, event dropped");
            return;
        }
        match state.callback.clone() {
            Some(callback) => callback(event),
            None => state.pending.push(event),
        }
    }
}

/// Mock vehicle link
pub struct MockVehicleLink {
    config: MockLinkConfig,
    shared: Arc<MockShared>,
}

impl MockVehicleLink {
    /// Create mock link with configuration
    pub fn new(config: MockLinkConfig) -> Self {
        Self {
            config,
            shared: Arc::new(MockShared::default()),
        }
    }

    /// Create mock link that discovers system 1 shortly after `listen`
    pub fn with_defaults() -> Self {
        Self::new(MockLinkConfig::default())
    }

    /// Handle for injecting events from tests or simulations
    pub fn handle(&self) -> MockLinkHandle {
        MockLinkHandle {
            shared: self.shared.clone(),
        }
    }

    /// Rate passed to the last accepted `set_position_rate`
    pub fn requested_rate(&self) -> Option<f64> {
        *self
            .shared
            .requested_rate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Descriptor passed to `connect`
    pub fn connected_descriptor(&self) -> Option<ConnectionDescriptor> {
        self.shared
            .descriptor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn spawn_discovery(&self) {
        let MockDiscovery::After(delay) = self.config.discovery else {
            debug!("mock link configured to never discover a system");
            return;
        };
        let system_id = self.config.system_id;
        let shared = self.shared.clone();

        thread::spawn(move || {
            thread::sleep(delay);
            if !shared.listening.load(Ordering::SeqCst) {
                return;
            }
            debug!(system_id, "mock system discovered");
            shared.deliver(VehicleEvent::SystemDiscovered { system_id });
            shared.deliver(VehicleEvent::ComponentDiscovered {
                system_id,
                component_id: 1,
                kind: ComponentKind::Autopilot,
            });
        });
    }

    fn spawn_telemetry(&self, telemetry: MockTelemetry, rate_hz: f64) {
        // One generator per link
        if self.shared.streaming.swap(true, Ordering::SeqCst) {
            return;
        }
        let system_id = self.config.system_id;
        let shared = self.shared.clone();
        let interval = Duration::from_secs_f64(1.0 / rate_hz);

        thread::spawn(move || {
            let mut sample: u64 = 0;
            debug!(system_id, rate_hz, "mock telemetry started");

            while shared.listening.load(Ordering::Relaxed) {
                let offset = telemetry.step_deg * sample as f64;
                let position = Position::new(
                    telemetry.origin.latitude_deg + offset,
                    telemetry.origin.longitude_deg + offset,
                    telemetry.origin.relative_altitude_m,
                );
                shared.deliver(VehicleEvent::PositionUpdate {
                    system_id,
                    position,
                });
                trace!(system_id, sample, "mock position sent");

                sample += 1;
                thread::sleep(interval);
            }

            debug!(system_id, "mock telemetry stopped");
        });
    }
}

impl Default for MockVehicleLink {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl VehicleLink for MockVehicleLink {
    fn name(&self) -> &str {
        "mock"
    }

    #[instrument(name = "mock_link_connect", skip(self), fields(descriptor = %descriptor))]
    async fn connect(&mut self, descriptor: &ConnectionDescriptor) -> Result<()> {
        if self.config.fail_connect {
            return Err(LinkError::connection(descriptor, "mock failure"));
        }
        *self
            .shared
            .descriptor
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(descriptor.clone());
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn listen(&self, callback: VehicleEventCallback) {
        // Idempotent: if already listening, don't start again
        if self.shared.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.shared.state();
            state.stopped = false;
            for event in state.pending.drain(..) {
                callback(event);
            }
            state.callback = Some(callback);
        }

        self.spawn_discovery();
    }

    #[instrument(name = "mock_link_set_position_rate", skip(self), fields(rate_hz))]
    async fn set_position_rate(&self, rate_hz: f64) -> Result<()> {
        if !self.shared.connected.load(Ordering::SeqCst) {
            return Err(LinkError::NotConnected);
        }
        if self.config.reject_position_rate {
            return Err(LinkError::rate_rejected(rate_hz, "mock failure"));
        }

        *self
            .shared
            .requested_rate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(rate_hz);

        if let Some(telemetry) = self.config.telemetry {
            self.spawn_telemetry(telemetry, rate_hz);
        }
        Ok(())
    }

    fn stop(&self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        let mut state = self.shared.state();
        state.stopped = true;
        state.callback = None;
    }

    fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::Relaxed)
    }
}

/// Cloneable injector for a [`MockVehicleLink`]
///
/// Safe to use from any thread, events keep their injection order.
#[derive(Clone)]
pub struct MockLinkHandle {
    shared: Arc<MockShared>,
}

impl MockLinkHandle {
    /// Inject an arbitrary event
    pub fn emit(&self, event: VehicleEvent) {
        self.shared.deliver(event);
    }

    /// Inject a manual capture trigger
    pub fn trigger(&self) {
        self.emit(VehicleEvent::CaptureTriggered {
            source: TriggerSource::Manual,
        });
    }

    /// Inject a position update from `system_id`
    pub fn position(&self, system_id: SystemId, position: Position) {
        self.emit(VehicleEvent::PositionUpdate {
            system_id,
            position,
        });
    }

    /// Inject a discovery of `system_id`
    pub fn discover(&self, system_id: SystemId) {
        self.emit(VehicleEvent::SystemDiscovered { system_id });
    }
}
