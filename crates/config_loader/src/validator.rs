//! Configuration validation
//!
//! Rules:
//! - field ranges declared on the config types (`validator` derive)
//! - command camera: program set and `{output}` placeholder present
//! - directory storage: directory set
//! - session_format is a valid chrono format without path separators

use ::validator::Validate;
use chrono::format::{Item, StrftimeItems};
use contracts::{AgentConfig, CameraKind, ContractError, StorageKind, OUTPUT_PLACEHOLDER};

/// Validate an AgentConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AgentConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_camera(config)?;
    validate_storage(config)?;
    Ok(())
}

/// Declarative field ranges
fn validate_ranges(config: &AgentConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

fn validate_camera(config: &AgentConfig) -> Result<(), ContractError> {
    let camera = &config.camera;
    if camera.kind != CameraKind::Command {
        return Ok(());
    }

    if camera.program.trim().is_empty() {
        return Err(ContractError::config_validation(
            "camera.program",
            "program cannot be empty for a command camera",
        ));
    }

    if !camera.args.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
        return Err(ContractError::config_validation(
            "camera.args",
            format!("arguments must contain the {OUTPUT_PLACEHOLDER} placeholder"),
        ));
    }

    Ok(())
}

fn validate_storage(config: &AgentConfig) -> Result<(), ContractError> {
    let storage = &config.storage;

    match storage.kind {
        StorageKind::Directory if storage.directory.as_os_str().is_empty() => {
            return Err(ContractError::config_validation(
                "storage.directory",
                "directory cannot be empty",
            ));
        }
        StorageKind::MountedMedia if storage.media_root.as_os_str().is_empty() => {
            return Err(ContractError::config_validation(
                "storage.media_root",
                "media_root cannot be empty",
            ));
        }
        _ => {}
    }

    if storage.session_folder {
        if StrftimeItems::new(&storage.session_format).any(|item| matches!(item, Item::Error)) {
            return Err(ContractError::config_validation(
                "storage.session_format",
                format!("invalid time format '{}'", storage.session_format),
            ));
        }
        if storage.session_format.contains('/') {
            return Err(ContractError::config_validation(
                "storage.session_format",
                "folder name cannot contain '/'",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_default() {
        assert!(validate(&AgentConfig::default()).is_ok());
    }

    #[test]
    fn test_missing_output_placeholder() {
        let mut config = AgentConfig::default();
        config.camera.args = vec!["-o".into(), "out.jpg".into()];
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("placeholder"), "got: {err}");
    }

    #[test]
    fn test_synthetic_camera_ignores_program() {
        let mut config = AgentConfig::default();
        config.camera.kind = CameraKind::Synthetic;
        config.camera.program = String::new();
        config.camera.args.clear();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_program() {
        let mut config = AgentConfig::default();
        config.camera.program = "  ".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("camera.program"), "got: {err}");
    }

    #[test]
    fn test_empty_directory() {
        let mut config = AgentConfig::default();
        config.storage.kind = StorageKind::Directory;
        config.storage.directory = PathBuf::new();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("storage.directory"), "got: {err}");
    }

    #[test]
    fn test_bad_session_format() {
        let mut config = AgentConfig::default();
        config.storage.session_format = "%Y/%m".into();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("session_format"), "got: {err}");
    }

    #[test]
    fn test_range_violation_reported() {
        let mut config = AgentConfig::default();
        config.camera.jpeg_quality = 0;
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("jpeg_quality"), "got: {err}");
    }
}
