//! Event router
//!
//! Single consumer of everything the vehicle link reports. Link callbacks only
//! stamp and forward; all state changes happen here, in arrival order.

use std::sync::Arc;
use std::time::Instant;

use contracts::{CaptureRequest, ConnectionState, SystemId, TriggerSource, VehicleEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::position_cache::PositionCache;
use crate::stats::CaptureStats;
use crate::worker::CaptureQueue;

/// Vehicle event with its arrival instant
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub event: VehicleEvent,
    pub received_at: Instant,
}

impl TimedEvent {
    pub fn now(event: VehicleEvent) -> Self {
        Self {
            event,
            received_at: Instant::now(),
        }
    }
}

/// Connection progress plus the system the agent locked on to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub state: ConnectionState,
    pub system_id: Option<SystemId>,
}

impl LinkStatus {
    pub fn is_discovered(&self) -> bool {
        self.system_id.is_some()
    }
}

/// Control messages from the coordinator
pub enum RouterCommand {
    /// Start forwarding triggers to this queue
    Arm(CaptureQueue),
}

/// Handle to the router task
///
/// Dropping the control sender (via `stop`) ends the task.
pub struct EventRouter {
    control_tx: mpsc::UnboundedSender<RouterCommand>,
    handle: JoinHandle<()>,
}

impl EventRouter {
    pub fn spawn(
        events: mpsc::UnboundedReceiver<TimedEvent>,
        status: watch::Sender<LinkStatus>,
        cache: Arc<PositionCache>,
        stats: Arc<CaptureStats>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let state = RouterState {
            status,
            cache,
            stats,
            queue: None,
        };
        let handle = tokio::spawn(route_events(events, control_rx, state));
        Self { control_tx, handle }
    }

    /// Forward triggers from now on
    ///
    /// Returns false if the router already stopped.
    pub fn arm(&self, queue: CaptureQueue) -> bool {
        self.control_tx.send(RouterCommand::Arm(queue)).is_ok()
    }

    /// Stop routing and release the capture queue
    #[instrument(name = "event_router_stop", skip(self))]
    pub async fn stop(self) {
        drop(self.control_tx);
        if let Err(e) = self.handle.await {
            tracing::error!(error = ?e, "event router panicked");
        }
    }
}

struct RouterState {
    status: watch::Sender<LinkStatus>,
    cache: Arc<PositionCache>,
    stats: Arc<CaptureStats>,
    queue: Option<CaptureQueue>,
}

async fn route_events(
    mut events: mpsc::UnboundedReceiver<TimedEvent>,
    mut control: mpsc::UnboundedReceiver<RouterCommand>,
    mut state: RouterState,
) {
    debug!("event router started");

    loop {
        tokio::select! {
            // control first so arming is never overtaken by a queued trigger
            biased;

            command = control.recv() => match command {
                Some(RouterCommand::Arm(queue)) => {
                    debug!("capture trigger handling armed");
                    state.queue = Some(queue);
                }
                None => {
                    // events already received still count
                    while let Ok(timed) = events.try_recv() {
                        state.handle(timed);
                    }
                    break;
                }
            },
            event = events.recv() => match event {
                Some(timed) => state.handle(timed),
                None => break,
            },
        }
    }

    debug!("event router stopped");
}

impl RouterState {
    fn locked_system(&self) -> Option<SystemId> {
        self.status.borrow().system_id
    }

    fn handle(&mut self, timed: TimedEvent) {
        trace!(kind = timed.event.kind(), "vehicle event");

        match timed.event {
            VehicleEvent::SystemDiscovered { system_id } => self.on_system(system_id),
            VehicleEvent::ComponentDiscovered {
                system_id,
                component_id,
                kind,
            } => {
                info!(system_id, component_id, kind = ?kind, "component discovered");
            }
            VehicleEvent::PositionUpdate {
                system_id,
                position,
            } => {
                if self.locked_system() != Some(system_id) {
                    trace!(system_id, "position from unselected system ignored");
                    return;
                }
                if !position.is_finite() {
                    warn!(system_id, ?position, "non-finite position ignored");
                    return;
                }
                self.cache.update_at(position, timed.received_at);
                self.stats.inc_position_updates();
                observability::record_position_update();
            }
            VehicleEvent::CaptureTriggered { source } => self.on_trigger(source, timed.received_at),
        }
    }

    fn on_system(&mut self, system_id: SystemId) {
        match self.locked_system() {
            None => {
                info!(system_id, "system discovered");
                self.status.send_modify(|status| {
                    status.state = ConnectionState::SystemDiscovered;
                    status.system_id = Some(system_id);
                });
            }
            Some(locked) if locked != system_id => {
                warn!(system_id, locked, "additional system ignored");
            }
            Some(_) => {}
        }
    }

    fn on_trigger(&mut self, source: TriggerSource, received_at: Instant) {
        let Some(queue) = &self.queue else {
            self.stats.inc_triggers_ignored();
            warn!(%source, "capture trigger before startup completed, ignored");
            return;
        };
        observability::record_trigger_received(&source);

        let request = CaptureRequest::new(source, received_at, self.cache.latest());
        self.stats.inc_triggers_received();
        debug!(%source, position_known = request.position.is_some(), "capture queued");
        if !queue.enqueue(request) {
            self.queue = None;
        }
    }
}
