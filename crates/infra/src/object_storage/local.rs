//! Filesystem-backed object storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, instrument};

use fleetpay_scheduler::ports::validate_object_path;
use fleetpay_scheduler::{ObjectStorage, StorageError};

/// Writes objects under `root` and serves them from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// `file://` URLs pointing straight at `root`.
    pub fn with_file_urls(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base_url = format!("file://{}", root.display());
        Self::new(root, base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()), err)]
    async fn store(&self, bytes: Vec<u8>, path: &str) -> Result<String, StorageError> {
        validate_object_path(path)?;
        let target = self.root.join(path);

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Io(format!("{}: {e}", parent.display())))?;
        }

        // Readers must never see a partial document.
        let tmp = target.with_extension("partial");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| StorageError::Io(format!("{}: {e}", target.display())))?;

        debug!(path = %target.display(), "object stored");
        Ok(self.url_for(path))
    }
}
