//! Filesystem-backed object storage.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::traits::ObjectStorage;
use super::types::CollaboratorError;

/// Object storage rooted at a local directory. Keys are relative paths.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key under the root, refusing anything that would escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, CollaboratorError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(CollaboratorError::NotFound(format!(
                "invalid storage key: {}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Store an object (used by upload tooling and tests).
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CollaboratorError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    fn name(&self) -> &str {
        "fs"
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CollaboratorError> {
        let path = self.resolve(key)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CollaboratorError::NotFound(format!("object not found: {}", key))
            }
            _ => CollaboratorError::Io(format!("{}: {}", key, e)),
        })
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CollaboratorError> {
        for key in keys {
            let path = self.resolve(key)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!(key = %key, "Deleted object"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CollaboratorError::Io(format!("{}: {}", key, e))),
            }
        }
        Ok(())
    }
}
