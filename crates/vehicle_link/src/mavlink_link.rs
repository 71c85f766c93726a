//! MAVLink vehicle link
//!
//! Talks to an autopilot over UDP, TCP or a serial port using the mavlink
//! crate. Two background threads per link:
//! - heartbeat: announces this agent as an onboard controller
//! - reader: receives messages, maps them to `VehicleEvent`s, acknowledges
//!   capture commands, resolves pending command acknowledgements

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use contracts::{ConnectionDescriptor, LinkConfig, VehicleEvent, VehicleEventCallback};
use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavModeFlag, MavResult, MavState, MavType,
    COMMAND_LONG_DATA, HEARTBEAT_DATA,
};
use mavlink::{MavConnection, MavHeader, MavlinkVersion};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::address::mavlink_address;
use crate::error::{LinkError, Result};
use crate::link::VehicleLink;
use crate::message_mapper::MessageMapper;

/// GLOBAL_POSITION_INT message id
const GLOBAL_POSITION_INT_ID: f32 = 33.0;

/// Pause after a failed receive
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);

type Connection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Identity and timing of the link
#[derive(Debug, Clone)]
pub struct MavlinkLinkSettings {
    pub system_id: u8,
    pub component_id: u8,
    pub heartbeat_interval: Duration,
    pub command_ack_timeout: Duration,
}

impl Default for MavlinkLinkSettings {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for MavlinkLinkSettings {
    fn from(config: &LinkConfig) -> Self {
        Self {
            system_id: config.system_id,
            component_id: config.component_id,
            heartbeat_interval: config.heartbeat_interval(),
            command_ack_timeout: config.command_ack_timeout(),
        }
    }
}

#[derive(Default)]
struct LinkShared {
    /// Heartbeat thread keeps running while set
    running: AtomicBool,
    listening: AtomicBool,
    sequence: AtomicU8,
    /// First autopilot seen: (system, component)
    target: Mutex<Option<(u8, u8)>>,
    pending_ack: Mutex<Option<(MavCmd, oneshot::Sender<MavResult>)>>,
}

impl LinkShared {
    fn send(&self, connection: &Connection, settings: &MavlinkLinkSettings, message: &MavMessage) -> Result<()> {
        let header = MavHeader {
            system_id: settings.system_id,
            component_id: settings.component_id,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };
        connection
            .send(&header, message)
            .map(|_| ())
            .map_err(|e| LinkError::send(message_name(message), e.to_string()))
    }

    fn target(&self) -> (u8, u8) {
        self.target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .unwrap_or((0, 0))
    }

    fn remember_target(&self, system_id: u8, component_id: u8) {
        let mut target = self.target.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if target.is_none() {
            *target = Some((system_id, component_id));
        }
    }

    fn expect_ack(&self, command: MavCmd) -> oneshot::Receiver<MavResult> {
        let (tx, rx) = oneshot::channel();
        *self.pending_ack.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((command, tx));
        rx
    }

    fn resolve_ack(&self, command: MavCmd, result: MavResult) {
        let mut pending = self.pending_ack.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(pending.as_ref(), Some((expected, _)) if *expected == command) {
            if let Some((_, tx)) = pending.take() {
                let _ = tx.send(result);
            }
        }
    }

    fn clear_ack(&self) {
        self.pending_ack
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

/// MAVLink vehicle link
pub struct MavlinkVehicleLink {
    settings: MavlinkLinkSettings,
    connection: Option<Connection>,
    shared: Arc<LinkShared>,
}

impl MavlinkVehicleLink {
    pub fn new(settings: MavlinkLinkSettings) -> Self {
        Self {
            settings,
            connection: None,
            shared: Arc::new(LinkShared::default()),
        }
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(LinkError::NotConnected)
    }

    fn spawn_heartbeat(&self, connection: Connection) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let shared = self.shared.clone();
        let settings = self.settings.clone();

        thread::spawn(move || {
            let heartbeat = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
                custom_mode: 0,
                mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
                autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
                base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
                system_status: MavState::MAV_STATE_ACTIVE,
                mavlink_version: 3,
            });

            while shared.running.load(Ordering::Relaxed) {
                if let Err(e) = shared.send(&connection, &settings, &heartbeat) {
                    warn!(error = %e, "heartbeat send failed");
                }
                thread::sleep(settings.heartbeat_interval);
            }
            debug!("heartbeat stopped");
        });
    }
}

impl Default for MavlinkVehicleLink {
    fn default() -> Self {
        Self::new(MavlinkLinkSettings::default())
    }
}

impl Drop for MavlinkVehicleLink {
    fn drop(&mut self) {
        self.stop();
    }
}

impl VehicleLink for MavlinkVehicleLink {
    fn name(&self) -> &str {
        "mavlink"
    }

    #[instrument(name = "mavlink_connect", skip(self), fields(descriptor = %descriptor))]
    async fn connect(&mut self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let address = mavlink_address(descriptor);
        debug!(address = %address, "opening mavlink connection");

        // Serial and TCP opens block
        let opened = tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&address))
            .await
            .map_err(|e| LinkError::connection(descriptor, e.to_string()))?;
        let mut connection = opened.map_err(|e| LinkError::connection(descriptor, e.to_string()))?;
        connection.set_protocol_version(MavlinkVersion::V2);

        let connection: Connection = Arc::from(connection);
        self.spawn_heartbeat(connection.clone());
        self.connection = Some(connection);

        info!(descriptor = %descriptor, "mavlink transport open");
        Ok(())
    }

    fn listen(&self, callback: VehicleEventCallback) {
        let connection = match self.connection() {
            Ok(connection) => connection.clone(),
            Err(_) => {
                warn!("listen called before connect, ignoring");
                return;
            }
        };
        // Idempotent: if already listening, don't start again
        if self.shared.listening.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = self.shared.clone();
        let settings = self.settings.clone();

        thread::spawn(move || {
            let mut mapper = MessageMapper::new(settings.system_id, settings.component_id);
            let mut consecutive_errors: u64 = 0;
            debug!("mavlink reader started");

            // recv blocks, so a stopped reader exits on the next message
            while shared.listening.load(Ordering::Relaxed) {
                let (header, message) = match connection.recv() {
                    Ok(received) => {
                        consecutive_errors = 0;
                        received
                    }
                    Err(e) => {
                        consecutive_errors += 1;
                        if consecutive_errors == 1 || consecutive_errors % 1000 == 0 {
                            warn!(error = %e, consecutive_errors, "mavlink receive failed");
                        }
                        thread::sleep(RECV_ERROR_BACKOFF);
                        continue;
                    }
                };

                if !shared.listening.load(Ordering::Relaxed) {
                    break;
                }

                if let MavMessage::COMMAND_ACK(ack) = &message {
                    shared.resolve_ack(ack.command, ack.result);
                }

                let mapped = mapper.map(&header, &message);
                if let Some(reply) = &mapped.reply {
                    if let Err(e) = shared.send(&connection, &settings, reply) {
                        warn!(error = %e, "command acknowledgement failed");
                    }
                }
                for event in mapped.events {
                    if let VehicleEvent::SystemDiscovered { system_id } = event {
                        shared.remember_target(system_id, header.component_id);
                    }
                    callback(event);
                }
            }
            debug!("mavlink reader stopped");
        });
    }

    #[instrument(name = "mavlink_set_position_rate", skip(self), fields(rate_hz))]
    async fn set_position_rate(&self, rate_hz: f64) -> Result<()> {
        let connection = self.connection()?.clone();
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return Err(LinkError::rate_rejected(rate_hz, "rate must be positive"));
        }

        let interval_us = (1_000_000.0 / rate_hz).round() as f32;
        let (target_system, target_component) = self.shared.target();
        let request = MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            param1: GLOBAL_POSITION_INT_ID,
            param2: interval_us,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 0.0,
            command: MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL,
            target_system,
            target_component,
            confirmation: 0,
        });

        let ack = self.shared.expect_ack(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL);
        if let Err(e) = self.shared.send(&connection, &self.settings, &request) {
            self.shared.clear_ack();
            return Err(e);
        }

        if !self.is_listening() {
            self.shared.clear_ack();
            warn!("not listening, cannot confirm position rate");
            return Ok(());
        }

        let outcome = tokio::time::timeout(self.settings.command_ack_timeout, ack).await;
        self.shared.clear_ack();

        match outcome {
            Ok(Ok(MavResult::MAV_RESULT_ACCEPTED)) => {
                debug!(interval_us, "position rate accepted");
                Ok(())
            }
            Ok(Ok(result)) => Err(LinkError::rate_rejected(rate_hz, format!("{result:?}"))),
            Ok(Err(_)) | Err(_) => {
                // Many autopilots stream position unasked; keep going
                warn!(
                    timeout_ms = self.settings.command_ack_timeout.as_millis() as u64,
                    "no acknowledgement for position rate request"
                );
                Ok(())
            }
        }
    }

    fn stop(&self) {
        self.shared.listening.store(false, Ordering::SeqCst);
        self.shared.running.store(false, Ordering::SeqCst);
    }

    fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::Relaxed)
    }
}

fn message_name(message: &MavMessage) -> &'static str {
    match message {
        MavMessage::HEARTBEAT(_) => "HEARTBEAT",
        MavMessage::COMMAND_LONG(_) => "COMMAND_LONG",
        MavMessage::COMMAND_ACK(_) => "COMMAND_ACK",
        _ => "message",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = LinkConfig {
            system_id: 2,
            component_id: 100,
            heartbeat_interval_ms: 500,
            ..Default::default()
        };
        let settings = MavlinkLinkSettings::from(&config);
        assert_eq!(settings.system_id, 2);
        assert_eq!(settings.component_id, 100);
        assert_eq!(settings.heartbeat_interval, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_rate_requires_connection() {
        let link = MavlinkVehicleLink::default();
        let err = link.set_position_rate(1.0).await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
    }

    #[test]
    fn test_listen_before_connect_is_ignored() {
        let link = MavlinkVehicleLink::default();
        link.listen(Arc::new(|_| {}));
        assert!(!link.is_listening());
    }

    #[test]
    fn test_ack_resolution_matches_command() {
        let shared = LinkShared::default();
        let mut rx = shared.expect_ack(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL);

        shared.resolve_ack(MavCmd::MAV_CMD_IMAGE_START_CAPTURE, MavResult::MAV_RESULT_ACCEPTED);
        assert!(rx.try_recv().is_err());

        shared.resolve_ack(MavCmd::MAV_CMD_SET_MESSAGE_INTERVAL, MavResult::MAV_RESULT_DENIED);
        assert_eq!(rx.try_recv().unwrap(), MavResult::MAV_RESULT_DENIED);
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let mut link = MavlinkVehicleLink::default();
        let descriptor: ConnectionDescriptor = "serial:///dev/does-not-exist:57600".parse().unwrap();
        let err = link.connect(&descriptor).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectionFailed { .. }));
    }
}
