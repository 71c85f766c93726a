//! External capability providers
//!
//! Narrow contracts for the camera, the metadata tagger and the storage
//! provisioner. The coordinator only ever talks to these traits.

use std::path::{Path, PathBuf};

use crate::{ContractError, Position};

/// Image capture trait
#[trait_variant::make(CaptureDevice: Send)]
pub trait LocalCaptureDevice {
    /// Device name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Produce one image file inside `destination_dir`
    ///
    /// `identifier` is unique per capture and must appear in the file name.
    ///
    /// # Errors
    /// Returns a capture error when no image file was produced.
    async fn capture(
        &self,
        destination_dir: &Path,
        identifier: &str,
    ) -> Result<PathBuf, ContractError>;
}

/// Geolocation metadata writer
#[trait_variant::make(Geotagger: Send)]
pub trait LocalGeotagger {
    /// Tagger name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write latitude/longitude/altitude into an existing image, in place
    async fn tag(&self, image_path: &Path, position: &Position) -> Result<(), ContractError>;
}

/// Storage destination provider
#[trait_variant::make(StorageProvisioner: Send)]
pub trait LocalStorageProvisioner {
    /// Ensure a writable directory exists and return its absolute path
    async fn provision(&self) -> Result<PathBuf, ContractError>;
}
