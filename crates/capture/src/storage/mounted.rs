//! MountedMediaProvisioner - first writable removable volume
//!
//! Desktop automounters place volumes at `<media_root>/<user>/<volume>`,
//! older setups at `<media_root>/<volume>`. Real mount points (a different
//! device than their parent) are preferred over plain directories.

use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ContractError, StorageProvisioner};
use tracing::{debug, info, instrument};

use super::{is_writable, prepare_directory};
use crate::error::StorageError;

/// Finds a writable volume under a media root
#[derive(Debug, Clone)]
pub struct MountedMediaProvisioner {
    media_root: PathBuf,
    session_format: Option<String>,
}

impl MountedMediaProvisioner {
    pub fn new(media_root: impl AsRef<Path>, session_format: Option<String>) -> Self {
        Self {
            media_root: media_root.as_ref().to_path_buf(),
            session_format,
        }
    }

    /// Candidate volumes in preference order
    fn candidates(media_root: &Path) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for first in sorted_subdirs(media_root) {
            let nested = sorted_subdirs(&first);
            if nested.is_empty() {
                candidates.push(first);
            } else {
                candidates.extend(nested);
            }
        }
        // Stable: keeps name order within each group
        candidates.sort_by_key(|dir| !is_mount_point(dir));
        candidates
    }

    fn locate(media_root: &Path, session_format: Option<&str>) -> Result<PathBuf, StorageError> {
        let volume = Self::candidates(media_root)
            .into_iter()
            .find(|dir| {
                let writable = is_writable(dir);
                debug!(volume = %dir.display(), writable, "media candidate");
                writable
            })
            .ok_or_else(|| StorageError::NoWritableMedia {
                root: media_root.to_path_buf(),
            })?;
        prepare_directory(&volume, session_format)
    }
}

fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

#[cfg(unix)]
fn is_mount_point(dir: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(parent) = dir.parent() else {
        return false;
    };
    match (fs::metadata(dir), fs::metadata(parent)) {
        (Ok(own), Ok(parent)) => own.dev() != parent.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn is_mount_point(_dir: &Path) -> bool {
    false
}

impl StorageProvisioner for MountedMediaProvisioner {
    #[instrument(name = "mounted_media_provision", skip(self), fields(media_root = %self.media_root.display()))]
    async fn provision(&self) -> Result<PathBuf, ContractError> {
        let media_root = self.media_root.clone();
        let session_format = self.session_format.clone();

        let root = tokio::task::spawn_blocking(move || Self::locate(&media_root, session_format.as_deref()))
            .await
            .map_err(|e| ContractError::storage(e.to_string()))??;

        info!(root = %root.display(), "storage ready on removable media");
        Ok(root)
    }
}
