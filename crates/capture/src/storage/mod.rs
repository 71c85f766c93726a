//! Storage provisioners

mod directory;
mod mounted;

pub use directory::DirectoryProvisioner;
pub use mounted::MountedMediaProvisioner;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use contracts::{ContractError, StorageConfig, StorageKind, StorageProvisioner};

use crate::error::StorageError;

/// Probe file used to check that a directory accepts writes
const WRITE_PROBE: &str = ".pixtrigger-write-probe";

/// Create `base/<now formatted with session_format>` when a format is given
/// and return the absolute directory
pub(crate) fn prepare_directory(base: &Path, session_format: Option<&str>) -> Result<PathBuf, StorageError> {
    let target = match session_format {
        Some(format) => base.join(Local::now().format(format).to_string()),
        None => base.to_path_buf(),
    };
    fs::create_dir_all(&target).map_err(|source| StorageError::CreateDir {
        path: target.clone(),
        source,
    })?;
    Ok(fs::canonicalize(&target)?)
}

/// Whether a file can be created (and removed) inside `dir`
pub(crate) fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(WRITE_PROBE);
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

/// Provisioner selected by configuration
pub enum ConfiguredProvisioner {
    MountedMedia(MountedMediaProvisioner),
    Directory(DirectoryProvisioner),
}

impl ConfiguredProvisioner {
    /// Create provisioner from configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        let session = config.session_folder.then(|| config.session_format.clone());
        match config.kind {
            StorageKind::MountedMedia => {
                Self::MountedMedia(MountedMediaProvisioner::new(&config.media_root, session))
            }
            StorageKind::Directory => {
                Self::Directory(DirectoryProvisioner::new(&config.directory, session))
            }
        }
    }
}

impl StorageProvisioner for ConfiguredProvisioner {
    async fn provision(&self) -> Result<PathBuf, ContractError> {
        match self {
            Self::MountedMedia(provisioner) => provisioner.provision().await,
            Self::Directory(provisioner) => provisioner.provision().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_prepare_directory_plain() {
        let dir = tempdir().unwrap();
        let target = prepare_directory(&dir.path().join("a/b"), None).unwrap();
        assert!(target.is_absolute());
        assert!(target.ends_with("a/b"));
        assert!(target.is_dir());
    }

    #[test]
    fn test_prepare_directory_session() {
        let dir = tempdir().unwrap();
        let target = prepare_directory(dir.path(), Some("session-%Y")).unwrap();
        let name = target.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("session-20"), "got: {name}");
    }

    #[test]
    fn test_is_writable_leaves_no_probe() {
        let dir = tempdir().unwrap();
        assert!(is_writable(dir.path()));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!is_writable(&dir.path().join("missing")));
    }

    #[tokio::test]
    async fn test_from_config_directory() {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            kind: StorageKind::Directory,
            directory: dir.path().join("captures"),
            session_folder: false,
            ..Default::default()
        };
        let root = ConfiguredProvisioner::from_config(&config).provision().await.unwrap();
        assert_eq!(root, fs::canonicalize(dir.path().join("captures")).unwrap());
    }
}
