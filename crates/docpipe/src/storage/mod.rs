//! Blob storage collaborator: pipeline-prefixed keys mapped to raw bytes.

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::StorageError;

pub use local::LocalStorage;
pub use memory::MemoryStorage;

#[async_trait]
pub trait BlobStorage: Send + Sync {
    async fn get_buffer(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Writes `bytes` at `path`, replacing any existing blob.
    async fn upload(&self, bytes: &[u8], path: &str) -> Result<(), StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Checks that `path` is a relative key without traversal.
pub(crate) fn validate_key(path: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    if path.starts_with('/') || path.starts_with('\\') || std::path::Path::new(path).is_absolute() {
        return Err(invalid("path is absolute"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("path contains traversal"));
    }
    Ok(())
}
