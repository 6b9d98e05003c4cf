//! Mock object storage for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::collaborators::{CollaboratorError, ObjectStorage};

/// In-memory implementation of the ObjectStorage trait.
///
/// Provides controllable behavior for testing:
/// - Seed objects with `put`
/// - Fail reads of specific keys
/// - Record fetched and deleted keys
#[derive(Debug, Clone, Default)]
pub struct MockObjectStorage {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    failing_keys: Arc<RwLock<HashSet<String>>>,
    fetched: Arc<RwLock<Vec<String>>>,
    deleted: Arc<RwLock<Vec<String>>>,
    next_error: Arc<RwLock<Option<CollaboratorError>>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object.
    pub async fn put(&self, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .write()
            .await
            .insert(key.to_string(), bytes.into());
    }

    /// Make every read of `key` fail with an I/O error.
    pub async fn fail_key(&self, key: &str) {
        self.failing_keys.write().await.insert(key.to_string());
    }

    /// Configure the next read to fail with the given error.
    pub async fn set_next_error(&self, error: CollaboratorError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    /// Keys read so far, in call order.
    pub async fn fetched_keys(&self) -> Vec<String> {
        self.fetched.read().await.clone()
    }

    /// Keys deleted so far, in call order.
    pub async fn deleted_keys(&self) -> Vec<String> {
        self.deleted.read().await.clone()
    }
}

#[async_trait]
impl ObjectStorage for MockObjectStorage {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, CollaboratorError> {
        self.fetched.write().await.push(key.to_string());

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        if self.failing_keys.read().await.contains(key) {
            return Err(CollaboratorError::Io(format!("simulated read failure: {}", key)));
        }

        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| CollaboratorError::NotFound(key.to_string()))
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CollaboratorError> {
        let mut objects = self.objects.write().await;
        let mut deleted = self.deleted.write().await;
        for key in keys {
            objects.remove(key);
            deleted.push(key.clone());
        }
        Ok(())
    }
}
