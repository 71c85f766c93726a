//! Geotagging

mod exif_writer;

pub use exif_writer::{build_gps_segment, embed_gps, insert_app1};

use std::path::{Path, PathBuf};

use contracts::{ContractError, Geotagger, Position};
use tracing::{debug, instrument};

use crate::error::GeotagError;

/// Writes GPS EXIF metadata into JPEG files in place
///
/// The tagged image is written next to the original and renamed over it, so
/// a failed write never leaves a half-written image behind.
#[derive(Debug, Clone, Default)]
pub struct ExifGeotagger;

impl ExifGeotagger {
    pub fn new() -> Self {
        Self
    }

    async fn tag_file(path: &Path, position: &Position) -> Result<(), GeotagError> {
        let original = tokio::fs::read(path).await?;
        let tagged = embed_gps(&original, position)?;

        replace_via_staging(path, &tagged).await?;
        Ok(())
    }
}

/// Write `contents` next to `path` and rename it over `path`
///
/// The staging file is removed whenever either step fails.
async fn replace_via_staging(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let staging = staging_path(path);
    let result = match tokio::fs::write(&staging, contents).await {
        Ok(()) => tokio::fs::rename(&staging, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(&staging).await;
    }
    result
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".geotag");
    path.with_file_name(name)
}

impl Geotagger for ExifGeotagger {
    fn name(&self) -> &str {
        "exif"
    }

    #[instrument(
        name = "exif_geotag",
        skip(self, position),
        fields(
            path = %image_path.display(),
            lat = position.latitude_deg,
            lon = position.longitude_deg,
            alt = position.relative_altitude_m
        )
    )]
    async fn tag(&self, image_path: &Path, position: &Position) -> Result<(), ContractError> {
        Self::tag_file(image_path, position)
            .await
            .map_err(|e| e.into_contract(image_path))?;
        debug!("gps metadata written");
        Ok(())
    }
}
