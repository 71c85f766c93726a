//! AgentConfig - Config Loader output
//!
//! Describes the complete agent configuration: link timing, camera, storage,
//! geotagging and observability. Every field has a default so an empty file
//! (or no file at all) is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AgentConfig {
    /// Configuration version
    pub version: ConfigVersion,

    /// Vehicle link timing
    #[validate(nested)]
    pub link: LinkConfig,

    /// Camera provider
    #[validate(nested)]
    pub camera: CameraConfig,

    /// Storage provider
    #[validate(nested)]
    pub storage: StorageConfig,

    /// Geotag policy
    #[validate(nested)]
    pub geotag: GeotagConfig,

    /// Logging and metrics
    #[validate(nested)]
    pub observability: ObservabilitySettings,
}

/// Vehicle link configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LinkConfig {
    /// How long to wait for the first remote system (ms)
    #[validate(range(min = 1))]
    pub discovery_timeout_ms: u64,

    /// Requested position telemetry rate (Hz)
    #[validate(range(min = 0.1, max = 50.0))]
    pub position_rate_hz: f64,

    /// Delay after subscribing to telemetry so a first sample can arrive (ms)
    pub initial_telemetry_delay_ms: u64,

    /// Own heartbeat period (ms)
    #[validate(range(min = 100, max = 10000))]
    pub heartbeat_interval_ms: u64,

    /// How long to wait for a command acknowledgement (ms)
    #[validate(range(min = 1))]
    pub command_ack_timeout_ms: u64,

    /// Own MAVLink system id
    #[validate(range(min = 1))]
    pub system_id: u8,

    /// Own MAVLink component id
    #[validate(range(min = 1))]
    pub component_id: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_ms: 2000,
            position_rate_hz: 1.0,
            initial_telemetry_delay_ms: 1000,
            heartbeat_interval_ms: 1000,
            command_ack_timeout_ms: 1000,
            system_id: 1,
            component_id: 191,
        }
    }
}

impl LinkConfig {
    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn initial_telemetry_delay(&self) -> Duration {
        Duration::from_millis(self.initial_telemetry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn command_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.command_ack_timeout_ms)
    }
}

/// Camera provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    /// External still-capture program
    #[default]
    Command,
    /// Rendered test frames
    Synthetic,
}

/// Replaced with the image path in camera program arguments
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CameraConfig {
    pub kind: CameraKind,

    /// Still-capture program (command kind)
    pub program: String,

    /// Program arguments, [`OUTPUT_PLACEHOLDER`] is replaced with the image path
    pub args: Vec<String>,

    /// Image file extension
    #[validate(length(min = 1, max = 8))]
    pub extension: String,

    /// Prepended to the capture identifier in the file name
    pub file_prefix: String,

    /// Upper bound for one capture (ms)
    #[validate(range(min = 1))]
    pub capture_timeout_ms: u64,

    /// Frame width (synthetic kind)
    #[validate(range(min = 1, max = 16384))]
    pub width: u32,

    /// Frame height (synthetic kind)
    #[validate(range(min = 1, max = 16384))]
    pub height: u32,

    /// JPEG quality (synthetic kind)
    #[validate(range(min = 1, max = 100))]
    pub jpeg_quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::Command,
            program: "rpicam-still".to_string(),
            args: vec![
                "--nopreview".to_string(),
                "--immediate".to_string(),
                "-o".to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
            ],
            extension: "jpg".to_string(),
            file_prefix: String::new(),
            capture_timeout_ms: 10_000,
            width: 1920,
            height: 1080,
            jpeg_quality: 90,
        }
    }
}

impl CameraConfig {
    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

/// Storage provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// First writable volume mounted under `media_root`
    #[default]
    MountedMedia,
    /// Fixed directory
    Directory,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StorageConfig {
    pub kind: StorageKind,

    /// Where removable media gets mounted
    pub media_root: PathBuf,

    /// Target directory (directory kind)
    pub directory: PathBuf,

    /// Create a timestamped folder per run
    pub session_folder: bool,

    /// chrono format string for the session folder name
    #[validate(length(min = 1))]
    pub session_format: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::MountedMedia,
            media_root: PathBuf::from("/media"),
            directory: PathBuf::from("./captures"),
            session_folder: true,
            session_format: "%Y-%m-%d_%H-%M-%S".to_string(),
        }
    }
}

/// Geotag configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct GeotagConfig {
    /// Write GPS metadata into captured images
    pub enabled: bool,

    /// Position older than this is reported as stale (ms)
    #[validate(range(min = 1))]
    pub stale_position_after_ms: u64,
}

impl Default for GeotagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_position_after_ms: 5000,
        }
    }
}

impl GeotagConfig {
    pub fn stale_position_after(&self) -> Duration {
        Duration::from_millis(self.stale_position_after_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilitySettings {
    pub log_format: LogFormatSetting,

    /// Default level when `RUST_LOG` is unset
    #[validate(length(min = 1))]
    pub default_log_level: String,

    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormatSetting::Pretty,
            default_log_level: "info".to_string(),
            metrics_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_timing() {
        let config = AgentConfig::default();
        assert_eq!(config.link.discovery_timeout(), Duration::from_secs(2));
        assert_eq!(config.link.initial_telemetry_delay(), Duration::from_secs(1));
        assert_eq!(config.link.position_rate_hz, 1.0);
        assert!(config.geotag.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_json_is_default() {
        let config: AgentConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.camera.program, "rpicam-still");
        assert_eq!(config.storage.kind, StorageKind::MountedMedia);
    }

    #[test]
    fn default_camera_args_carry_output_placeholder() {
        let camera = CameraConfig::default();
        assert_eq!(OUTPUT_PLACEHOLDER, "{output}");
        assert_eq!(camera.args.last().map(String::as_str), Some(OUTPUT_PLACEHOLDER));
    }

    #[test]
    fn out_of_range_rate_rejected() {
        let mut config = AgentConfig::default();
        config.link.position_rate_hz = 0.0;
        assert!(config.validate().is_err());
    }
}
