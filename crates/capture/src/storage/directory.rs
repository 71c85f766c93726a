//! DirectoryProvisioner - fixed directory

use std::path::{Path, PathBuf};

use contracts::{ContractError, StorageProvisioner};
use tracing::{info, instrument};

use super::prepare_directory;

/// Uses (and creates) a fixed directory, optionally with a session subfolder
#[derive(Debug, Clone)]
pub struct DirectoryProvisioner {
    directory: PathBuf,
    session_format: Option<String>,
}

impl DirectoryProvisioner {
    pub fn new(directory: impl AsRef<Path>, session_format: Option<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            session_format,
        }
    }
}

impl StorageProvisioner for DirectoryProvisioner {
    #[instrument(name = "directory_provision", skip(self), fields(directory = %self.directory.display()))]
    async fn provision(&self) -> Result<PathBuf, ContractError> {
        let directory = self.directory.clone();
        let session_format = self.session_format.clone();

        let root = tokio::task::spawn_blocking(move || prepare_directory(&directory, session_format.as_deref()))
            .await
            .map_err(|e| ContractError::storage(e.to_string()))??;

        info!(root = %root.display(), "storage ready");
        Ok(root)
    }
}
