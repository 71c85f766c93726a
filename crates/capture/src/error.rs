//! Provider error types
//!
//! Each provider fails with its own error and converts into `ContractError`
//! at the trait boundary.

use std::path::PathBuf;

use contracts::ContractError;
use thiserror::Error;

/// Camera errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Capture program could not be started
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Capture program exited unsuccessfully
    #[error("'{program}' exited with {status}: {stderr}")]
    ExitStatus {
        program: String,
        status: String,
        stderr: String,
    },

    /// Program succeeded but left no file behind
    #[error("no image written at {}", path.display())]
    MissingOutput { path: PathBuf },

    /// Frame rendering or encoding failed
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    pub fn into_contract(self, identifier: &str) -> ContractError {
        ContractError::capture(identifier, self.to_string())
    }
}

/// EXIF writer errors
#[derive(Debug, Error)]
pub enum GeotagError {
    #[error("not a JPEG file")]
    NotJpeg,

    #[error("truncated JPEG segment at offset {offset}")]
    Truncated { offset: usize },

    #[error("position is not finite")]
    InvalidPosition,

    /// Existing Exif block cannot be parsed, image left untouched
    #[error("malformed Exif data: {0}")]
    MalformedExif(&'static str),

    #[error("Exif segment of {len} bytes does not fit in APP1")]
    ExifTooLarge { len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GeotagError {
    pub fn into_contract(self, path: &std::path::Path) -> ContractError {
        ContractError::geotag(path.display().to_string(), self.to_string())
    }
}

/// Storage provisioning errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Nothing writable under the media root
    #[error("no writable media under {}", root.display())]
    NoWritableMedia { root: PathBuf },

    #[error("cannot create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StorageError> for ContractError {
    fn from(err: StorageError) -> Self {
        ContractError::storage(err.to_string())
    }
}
