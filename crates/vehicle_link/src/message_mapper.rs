//! MAVLink message to VehicleEvent mapping
//!
//! Pure translation, no I/O. Keeps the small amount of state needed to report
//! each system and component once, to drop re-delivered triggers and to
//! answer capture commands.

use std::collections::{HashMap, HashSet};

use contracts::{ComponentKind, Position, TriggerSource, VehicleEvent};
use mavlink::common::{
    MavAutopilot, MavCmd, MavMessage, MavResult, MavType, COMMAND_ACK_DATA, COMMAND_LONG_DATA,
};
use mavlink::MavHeader;

/// DO_DIGICAM_CONTROL param5 value requesting a shot
const DIGICAM_SHOOT: f32 = 1.0;

/// Result of mapping one received message
#[derive(Debug, Default)]
pub struct Mapped {
    pub events: Vec<VehicleEvent>,
    /// Message to send back to the sender (command acknowledgement)
    pub reply: Option<MavMessage>,
}

impl Mapped {
    fn events(events: Vec<VehicleEvent>) -> Self {
        Self { events, reply: None }
    }

    fn trigger(source: TriggerSource) -> Self {
        Self::events(vec![VehicleEvent::CaptureTriggered { source }])
    }
}

/// Stateful message mapper
#[derive(Debug)]
pub struct MessageMapper {
    own_system_id: u8,
    own_component_id: u8,
    systems: HashSet<u8>,
    components: HashSet<(u8, u8)>,
    /// Last capture command accepted from each sender
    last_command: HashMap<(u8, u8), MavCmd>,
    last_trigger_seq: HashMap<u8, u32>,
    last_image_index: HashMap<u8, i32>,
}

impl MessageMapper {
    /// Create mapper for a link that identifies itself as `own_system_id/own_component_id`
    pub fn new(own_system_id: u8, own_component_id: u8) -> Self {
        Self {
            own_system_id,
            own_component_id,
            systems: HashSet::new(),
            components: HashSet::new(),
            last_command: HashMap::new(),
            last_trigger_seq: HashMap::new(),
            last_image_index: HashMap::new(),
        }
    }

    /// Translate one received message
    ///
    /// Returns no event for messages the agent does not care about.
    pub fn map(&mut self, header: &MavHeader, message: &MavMessage) -> Mapped {
        if header.system_id == self.own_system_id && header.component_id == self.own_component_id {
            return Mapped::default();
        }

        match message {
            MavMessage::HEARTBEAT(data) => {
                Mapped::events(self.map_heartbeat(header, data.mavtype, data.autopilot))
            }
            MavMessage::GLOBAL_POSITION_INT(data) => Mapped::events(vec![VehicleEvent::PositionUpdate {
                system_id: header.system_id,
                position: Position::new(
                    f64::from(data.lat) / 1e7,
                    f64::from(data.lon) / 1e7,
                    f64::from(data.relative_alt) / 1000.0,
                ),
            }]),
            MavMessage::CAMERA_TRIGGER(data) => {
                if self.last_trigger_seq.insert(header.system_id, data.seq) == Some(data.seq) {
                    return Mapped::default();
                }
                Mapped::trigger(TriggerSource::CameraTrigger { seq: data.seq })
            }
            MavMessage::CAMERA_IMAGE_CAPTURED(data) => {
                if self.last_image_index.insert(header.system_id, data.image_index)
                    == Some(data.image_index)
                {
                    return Mapped::default();
                }
                Mapped::trigger(TriggerSource::ImageCaptured {
                    image_index: data.image_index,
                })
            }
            MavMessage::COMMAND_LONG(data) => self.map_command(header, data),
            _ => Mapped::default(),
        }
    }

    fn map_command(&mut self, header: &MavHeader, data: &COMMAND_LONG_DATA) -> Mapped {
        if !self.addressed_to_us(data.target_system, data.target_component) {
            return Mapped::default();
        }
        let source = match data.command {
            MavCmd::MAV_CMD_IMAGE_START_CAPTURE => TriggerSource::ImageStartCapture,
            MavCmd::MAV_CMD_DO_DIGICAM_CONTROL if data.param5 == DIGICAM_SHOOT => {
                TriggerSource::DigicamControl
            }
            // zoom, focus and other digicam settings: nothing to do here
            MavCmd::MAV_CMD_DO_DIGICAM_CONTROL => {
                return Mapped {
                    events: Vec::new(),
                    reply: Some(ack(data.command, MavResult::MAV_RESULT_UNSUPPORTED)),
                };
            }
            _ => return Mapped::default(),
        };

        let reply = Some(ack(data.command, MavResult::MAV_RESULT_ACCEPTED));
        let sender = (header.system_id, header.component_id);
        // the previous ack was lost; acknowledge again without a second shot
        if data.confirmation > 0 && self.last_command.get(&sender) == Some(&data.command) {
            return Mapped {
                events: Vec::new(),
                reply,
            };
        }
        self.last_command.insert(sender, data.command);
        Mapped {
            events: vec![VehicleEvent::CaptureTriggered { source }],
            reply,
        }
    }

    fn map_heartbeat(
        &mut self,
        header: &MavHeader,
        mavtype: MavType,
        autopilot: MavAutopilot,
    ) -> Vec<VehicleEvent> {
        if mavtype == MavType::MAV_TYPE_GCS {
            return Vec::new();
        }

        let mut events = Vec::new();
        if autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID && self.systems.insert(header.system_id) {
            events.push(VehicleEvent::SystemDiscovered {
                system_id: header.system_id,
            });
        }
        if self.components.insert((header.system_id, header.component_id)) {
            events.push(VehicleEvent::ComponentDiscovered {
                system_id: header.system_id,
                component_id: header.component_id,
                kind: classify_component(header.component_id, mavtype, autopilot),
            });
        }
        events
    }

    fn addressed_to_us(&self, target_system: u8, target_component: u8) -> bool {
        (target_system == 0 || target_system == self.own_system_id)
            && (target_component == 0 || target_component == self.own_component_id)
    }
}

fn ack(command: MavCmd, result: MavResult) -> MavMessage {
    MavMessage::COMMAND_ACK(COMMAND_ACK_DATA {
        command,
        result,
        ..Default::default()
    })
}

fn classify_component(component_id: u8, mavtype: MavType, autopilot: MavAutopilot) -> ComponentKind {
    match (component_id, mavtype) {
        (_, MavType::MAV_TYPE_CAMERA) | (100..=105, _) => ComponentKind::Camera,
        (_, MavType::MAV_TYPE_GIMBAL) | (154, _) => ComponentKind::Gimbal,
        _ if autopilot != MavAutopilot::MAV_AUTOPILOT_INVALID => ComponentKind::Autopilot,
        (id, _) => ComponentKind::Other(id),
    }
}
