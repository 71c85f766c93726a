//! VehicleEvent - link output
//!
//! Every notification coming from the vehicle link is normalized into a
//! `VehicleEvent` at the link boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Position;

/// MAVLink system id of a remote vehicle
pub type SystemId = u8;

/// MAVLink component id within a system
pub type ComponentId = u8;

/// Vehicle event callback type
///
/// The link calls this from its own threads; implementations must not block.
pub type VehicleEventCallback = Arc<dyn Fn(VehicleEvent) + Send + Sync>;

/// Normalized vehicle notification
#[derive(Debug, Clone, PartialEq)]
pub enum VehicleEvent {
    /// A remote system reported itself connected
    SystemDiscovered { system_id: SystemId },

    /// A component of a system (camera, gimbal, ...) was found
    ComponentDiscovered {
        system_id: SystemId,
        component_id: ComponentId,
        kind: ComponentKind,
    },

    /// Global position telemetry
    PositionUpdate {
        system_id: SystemId,
        position: Position,
    },

    /// One photograph should be taken now
    CaptureTriggered { source: TriggerSource },
}

impl VehicleEvent {
    /// Short name used in logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SystemDiscovered { .. } => "system_discovered",
            Self::ComponentDiscovered { .. } => "component_discovered",
            Self::PositionUpdate { .. } => "position_update",
            Self::CaptureTriggered { .. } => "capture_triggered",
        }
    }
}

/// Where a capture trigger originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// `CAMERA_TRIGGER` emitted by the autopilot
    CameraTrigger { seq: u32 },
    /// `MAV_CMD_IMAGE_START_CAPTURE` command
    ImageStartCapture,
    /// `MAV_CMD_DO_DIGICAM_CONTROL` command
    DigicamControl,
    /// `CAMERA_IMAGE_CAPTURED` reported by a camera component
    ImageCaptured { image_index: i32 },
    /// Injected without a vehicle (tests, simulation)
    Manual,
}

impl TriggerSource {
    pub fn label(&self) -> &'static str {
        match self {
            Self::CameraTrigger { .. } => "camera_trigger",
            Self::ImageStartCapture => "image_start_capture",
            Self::DigicamControl => "digicam_control",
            Self::ImageCaptured { .. } => "image_captured",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CameraTrigger { seq } => write!(f, "camera_trigger(seq={seq})"),
            Self::ImageCaptured { image_index } => write!(f, "image_captured(index={image_index})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Component categories the agent cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Autopilot,
    Camera,
    Gimbal,
    Other(u8),
}

/// Link connection state
///
/// Transitions are monotonic during startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    SystemDiscovered,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_is_ordered() {
        assert!(ConnectionState::Disconnected < ConnectionState::Connected);
        assert!(ConnectionState::Connected < ConnectionState::SystemDiscovered);
    }

    #[test]
    fn trigger_source_display() {
        assert_eq!(
            TriggerSource::CameraTrigger { seq: 7 }.to_string(),
            "camera_trigger(seq=7)"
        );
        assert_eq!(TriggerSource::Manual.to_string(), "manual");
    }

    #[test]
    fn trigger_source_serde() {
        let json = serde_json::to_string(&TriggerSource::DigicamControl).unwrap();
        assert_eq!(json, "\"digicam_control\"");
    }
}
