//! SyntheticCamera - renders test frames
//!
//! Produces a real JPEG so the rest of the pipeline (geotagging, storage)
//! behaves exactly as with a hardware camera.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use contracts::{CameraConfig, CaptureDevice, ContractError};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage};
use tracing::{debug, instrument};

use super::image_file_name;
use crate::error::CaptureError;

/// Camera that draws a gradient frame, shifted per capture
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    quality: u8,
    extension: String,
    file_prefix: String,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            quality: 90,
            extension: "jpg".to_string(),
            file_prefix: String::new(),
        }
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            quality: config.jpeg_quality,
            extension: config.extension.clone(),
            file_prefix: config.file_prefix.clone(),
        }
    }

    fn render(width: u32, height: u32, seed: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (seed.wrapping_mul(37) % 256) as u8;
            Rgb([r, g, b])
        })
    }

    fn write_jpeg(path: &Path, frame: &RgbImage, quality: u8) -> Result<(), CaptureError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, quality)
            .write_image(frame.as_raw(), frame.width(), frame.height(), ExtendedColorType::Rgb8)
            .map_err(|e| CaptureError::Encode(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

impl CaptureDevice for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    #[instrument(
        name = "synthetic_camera_capture",
        skip(self, destination_dir),
        fields(identifier = %identifier, width = self.width, height = self.height)
    )]
    async fn capture(&self, destination_dir: &Path, identifier: &str) -> Result<PathBuf, ContractError> {
        let path = destination_dir.join(image_file_name(&self.file_prefix, identifier, &self.extension));
        let (width, height, quality) = (self.width, self.height, self.quality);
        let seed = identifier.bytes().fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
        let target = path.clone();

        tokio::task::spawn_blocking(move || {
            let frame = Self::render(width, height, seed);
            Self::write_jpeg(&target, &frame, quality)
        })
        .await
        .map_err(|e| ContractError::capture(identifier, e.to_string()))?
        .map_err(|e| e.into_contract(identifier))?;

        debug!(path = %path.display(), "synthetic frame written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_writes_decodable_jpeg() {
        let dir = tempdir().unwrap();
        let camera = SyntheticCamera::new(64, 48);

        let path = camera.capture(dir.path(), "5").await.unwrap();
        assert_eq!(path.file_name().unwrap(), "5.jpg");

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_missing_directory_is_failure() {
        let dir = tempdir().unwrap();
        let camera = SyntheticCamera::new(8, 8);

        let err = camera
            .capture(&dir.path().join("not-there"), "0")
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Capture { .. }));
    }
}
