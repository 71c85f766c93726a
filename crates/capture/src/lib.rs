//! # Capture
//!
//! Default capability providers used by the coordinator.
//!
//! Responsibilities:
//! - Produce image files (`CommandCamera`, `SyntheticCamera`)
//! - Write GPS metadata into JPEGs (`ExifGeotagger`)
//! - Resolve the storage root (`MountedMediaProvisioner`, `DirectoryProvisioner`)
//!
//! Each provider family has a `Configured*` enum built from `AgentConfig`.

pub mod camera;
pub mod error;
pub mod geotag;
pub mod storage;

pub use camera::{CommandCamera, ConfiguredCamera, SyntheticCamera};
pub use error::{CaptureError, GeotagError, StorageError};
pub use geotag::{ExifGeotagger, embed_gps};
pub use storage::{ConfiguredProvisioner, DirectoryProvisioner, MountedMediaProvisioner};
