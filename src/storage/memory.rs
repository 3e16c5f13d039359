//! In-process object store.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{validate_object_path, StorageConnector};
use crate::error::{Error, Result};

/// Object store backed by a `HashMap`
///
/// Useful for tests and for running the orchestrator without a backing
/// service. Contents are lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl StorageConnector for MemoryStore {
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()> {
        validate_object_path(path)?;
        self.objects.write().insert(path.to_string(), data.to_vec());
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        validate_object_path(path)?;
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::StorageNotFound(path.to_string()))
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        validate_object_path(path)?;
        Ok(self.objects.write().remove(path).is_some())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        validate_object_path(path)?;
        Ok(self.objects.read().contains_key(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        paths.sort();
        Ok(paths)
    }
}
