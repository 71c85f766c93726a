//! # Vehicle Link
//!
//! Connection to the vehicle over MAVLink.
//!
//! Responsibilities:
//! - Open a link from a `ConnectionDescriptor`
//! - Normalize discovery, telemetry and trigger messages into `VehicleEvent`s
//! - Request the position telemetry rate
//! - Provide a scriptable mock for tests and simulation
//!
//! ## Feature Flags
//!
//! - `mavlink`: Enable the MAVLink link (requires the mavlink crate)

pub mod address;
pub mod error;
pub mod link;
pub mod mock_link;

#[cfg(feature = "mavlink")]
pub mod mavlink_link;
#[cfg(feature = "mavlink")]
pub mod message_mapper;

pub use address::mavlink_address;
pub use contracts::{ConnectionDescriptor, VehicleEvent, VehicleEventCallback};
pub use error::{LinkError, Result};
pub use link::VehicleLink;
pub use mock_link::{MockDiscovery, MockLinkConfig, MockLinkHandle, MockTelemetry, MockVehicleLink};

#[cfg(feature = "mavlink")]
pub use mavlink_link::{MavlinkLinkSettings, MavlinkVehicleLink};
#[cfg(feature = "mavlink")]
pub use message_mapper::{Mapped, MessageMapper};
