//! Object storage port.

use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::RwLock;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    #[error("object storage io error: {0}")]
    Io(String),
    #[error("object storage unavailable: {0}")]
    Unavailable(String),
}

/// Stores bytes at a relative path and hands back a retrievable URL.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn store(&self, bytes: Vec<u8>, path: &str) -> Result<String, StorageError>;
}

/// Object paths are relative, non-empty and may not climb out of the root.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::InvalidPath("empty path".to_string()));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(StorageError::InvalidPath(path.to_string())),
        }
    }
    Ok(())
}

/// In-memory object storage for tests/dev.
#[derive(Debug)]
pub struct InMemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.read().expect("object storage lock poisoned").get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().expect("object storage lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new("mem://objects")
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn store(&self, bytes: Vec<u8>, path: &str) -> Result<String, StorageError> {
        validate_object_path(path)?;
        self.objects
            .write()
            .expect("object storage lock poisoned")
            .insert(path.to_string(), bytes);
        Ok(format!("{}/{}", self.base_url, path))
    }
}
