use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_key, BlobStorage};
use crate::error::StorageError;

/// Blob storage held in memory. Keys are kept sorted.
#[derive(Default)]
pub struct MemoryStorage {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paths(&self) -> Vec<String> {
        self.blobs
            .lock()
            .map(|guard| guard.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs
            .lock()
            .map(|guard| guard.contains_key(path))
            .unwrap_or(false)
    }

    fn poisoned(path: &str) -> StorageError {
        StorageError::InvalidPath {
            path: path.to_string(),
            reason: "storage lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn get_buffer(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(path)?;
        let guard = self.blobs.lock().map_err(|_| Self::poisoned(path))?;
        guard.get(path).cloned().ok_or_else(|| StorageError::NotFound {
            path: path.to_string(),
        })
    }

    async fn upload(&self, bytes: &[u8], path: &str) -> Result<(), StorageError> {
        validate_key(path)?;
        self.blobs
            .lock()
            .map_err(|_| Self::poisoned(path))?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        validate_key(path)?;
        self.blobs
            .lock()
            .map_err(|_| Self::poisoned(path))?
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })
    }
}
