//! Camera providers

mod command;
mod synthetic;

pub use command::CommandCamera;
pub use synthetic::SyntheticCamera;

use std::path::{Path, PathBuf};

use contracts::{CameraConfig, CameraKind, CaptureDevice, ContractError};

/// File name for one capture: `<prefix><identifier>.<extension>`
pub fn image_file_name(prefix: &str, identifier: &str, extension: &str) -> String {
    format!("{prefix}{identifier}.{extension}")
}

/// Camera selected by configuration
pub enum ConfiguredCamera {
    Command(CommandCamera),
    Synthetic(SyntheticCamera),
}

impl ConfiguredCamera {
    /// Create camera from configuration
    pub fn from_config(config: &CameraConfig) -> Self {
        match config.kind {
            CameraKind::Command => Self::Command(CommandCamera::from_config(config)),
            CameraKind::Synthetic => Self::Synthetic(SyntheticCamera::from_config(config)),
        }
    }
}

impl CaptureDevice for ConfiguredCamera {
    fn name(&self) -> &str {
        match self {
            Self::Command(camera) => camera.name(),
            Self::Synthetic(camera) => camera.name(),
        }
    }

    async fn capture(&self, destination_dir: &Path, identifier: &str) -> Result<PathBuf, ContractError> {
        match self {
            Self::Command(camera) => camera.capture(destination_dir, identifier).await,
            Self::Synthetic(camera) => camera.capture(destination_dir, identifier).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_name() {
        assert_eq!(image_file_name("", "0", "jpg"), "0.jpg");
        assert_eq!(image_file_name("img_", "12", "jpeg"), "img_12.jpeg");
    }

    #[test]
    fn test_from_config_selects_kind() {
        let mut config = CameraConfig::default();
        assert_eq!(ConfiguredCamera::from_config(&config).name(), "rpicam-still");

        config.kind = CameraKind::Synthetic;
        assert_eq!(ConfiguredCamera::from_config(&config).name(), "synthetic");
    }
}
