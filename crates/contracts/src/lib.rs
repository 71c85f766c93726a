//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the agent: the data
//! model flowing from the vehicle link to the capture pipeline, and the traits
//! the external capability providers implement.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Arrival instants (`std::time::Instant`) are stamped at the link boundary
//! - Position age is always measured against the arrival instant, never the
//!   autopilot boot time

mod agent_config;
mod collaborators;
mod descriptor;
mod error;
mod event;
mod outcome;
mod position;

pub use agent_config::*;
pub use collaborators::{
    CaptureDevice, Geotagger, LocalCaptureDevice, LocalGeotagger, LocalStorageProvisioner,
    StorageProvisioner,
};
pub use descriptor::{ConnectionDescriptor, DEFAULT_SERIAL_BAUD, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT};
pub use error::*;
pub use event::*;
pub use outcome::*;
pub use position::{Position, PositionFix};
