//! CommandCamera - runs an external still-capture program

use std::path::{Path, PathBuf};
use std::process::Stdio;

use contracts::{CameraConfig, CaptureDevice, ContractError, OUTPUT_PLACEHOLDER};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::image_file_name;
use crate::error::CaptureError;

/// Longest stderr excerpt kept in an error
const STDERR_EXCERPT: usize = 512;

/// Camera backed by a program such as `rpicam-still`
///
/// The child is killed if the capture future is dropped, so an outer timeout
/// does not leave it running.
#[derive(Debug, Clone)]
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    extension: String,
    file_prefix: String,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>, extension: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: extension.into(),
            file_prefix: String::new(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn from_config(config: &CameraConfig) -> Self {
        Self::new(&config.program, config.args.clone(), &config.extension)
            .with_prefix(&config.file_prefix)
    }

    /// Expand the argument template for one output path
    fn expand_args(&self, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect()
    }

    async fn run(&self, output: &Path) -> Result<(), CaptureError> {
        let args = self.expand_args(output);
        debug!(program = %self.program, ?args, "running capture program");

        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CaptureError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr = stderr.trim();
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(CaptureError::ExitStatus {
                program: self.program.clone(),
                status: result.status.to_string(),
                stderr: excerpt,
            });
        }

        if tokio::fs::metadata(output).await.is_err() {
            return Err(CaptureError::MissingOutput {
                path: output.to_path_buf(),
            });
        }
        Ok(())
    }
}

impl CaptureDevice for CommandCamera {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(
        name = "command_camera_capture",
        skip(self, destination_dir),
        fields(program = %self.program, identifier = %identifier)
    )]
    async fn capture(&self, destination_dir: &Path, identifier: &str) -> Result<PathBuf, ContractError> {
        let path = destination_dir.join(image_file_name(&self.file_prefix, identifier, &self.extension));

        match self.run(&path).await {
            Ok(()) => Ok(path),
            Err(e) => {
                warn!(error = %e, "capture program failed");
                Err(e.into_contract(identifier))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn shell(script: &str) -> CommandCamera {
        CommandCamera::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string(), "{output}".to_string()],
            "jpg",
        )
    }

    #[test]
    fn test_expand_args() {
        let camera = CommandCamera::new(
            "rpicam-still",
            vec!["-o".into(), "{output}".into(), "--meta={output}.json".into()],
            "jpg",
        );
        let args = camera.expand_args(Path::new("/mnt/usb/3.jpg"));
        assert_eq!(args, vec!["-o", "/mnt/usb/3.jpg", "--meta=/mnt/usb/3.jpg.json"]);
    }

    #[tokio::test]
    async fn test_capture_writes_named_file() {
        let dir = tempdir().unwrap();
        let camera = shell("printf 'frame' > \"$1\"").with_prefix("img_");

        let path = camera.capture(dir.path(), "0").await.unwrap();
        assert_eq!(path, dir.path().join("img_0.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"frame");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let dir = tempdir().unwrap();
        let camera = shell("echo 'no camera detected' >&2; exit 3");

        let err = camera.capture(dir.path(), "1").await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ContractError::Capture { .. }));
        assert!(message.contains("no camera detected"), "got: {message}");
    }

    #[tokio::test]
    async fn test_missing_output_is_failure() {
        let dir = tempdir().unwrap();
        let camera = shell("true");

        let err = camera.capture(dir.path(), "2").await.unwrap_err();
        assert!(err.to_string().contains("no image written"));
    }

    #[tokio::test]
    async fn test_unknown_program_is_failure() {
        let dir = tempdir().unwrap();
        let camera = CommandCamera::new("pixtrigger-no-such-camera", vec!["{output}".into()], "jpg");

        let err = camera.capture(dir.path(), "3").await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
