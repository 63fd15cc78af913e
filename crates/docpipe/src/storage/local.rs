use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{validate_key, BlobStorage};
use crate::error::StorageError;

/// Blob storage on the local filesystem, rooted at a directory.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_key(path)?;
        Ok(self.root.join(path))
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

#[async_trait]
impl BlobStorage for LocalStorage {
    async fn get_buffer(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.resolve(path)?;
        match tokio::fs::read(&full_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(StorageError::ReadBlob {
                path: full_path,
                source: e,
            }),
        }
    }

    async fn upload(&self, bytes: &[u8], path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            self.ensure_directory(parent).await?;
        }

        tokio::fs::write(&full_path, bytes)
            .await
            .map_err(|e| StorageError::WriteBlob {
                path: full_path.clone(),
                source: e,
            })?;
        tracing::debug!(path = %path, bytes = bytes.len(), "Blob written");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(path)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound {
                path: path.to_string(),
            }),
            Err(e) => Err(StorageError::DeleteBlob {
                path: full_path,
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage.upload(b"Hello", "invoices/2026/a.pdf").await.unwrap();

        let path = temp_dir.path().join("invoices/2026/a.pdf");
        assert!(path.exists());
        assert_eq!(storage.get_buffer("invoices/2026/a.pdf").await.unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage.upload(b"First", "p/a.json").await.unwrap();
        storage.upload(b"Second", "p/a.json").await.unwrap();

        assert_eq!(storage.get_buffer("p/a.json").await.unwrap(), b"Second");
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        let err = storage.get_buffer("p/missing.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));

        let err = storage.delete("p/missing.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_removes_blob() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage.upload(b"x", "p/a.pdf").await.unwrap();
        storage.delete("p/a.pdf").await.unwrap();
        assert!(!temp_dir.path().join("p/a.pdf").exists());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().join("root"));

        let err = storage.upload(b"x", "../escape.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
        assert!(!temp_dir.path().join("escape.txt").exists());
    }
}
