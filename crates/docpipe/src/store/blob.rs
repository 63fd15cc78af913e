use std::sync::Arc;

use async_trait::async_trait;

use super::{result_key, stored_id, ErrorRecord, ResultStore};
use crate::config::{load_pipelines_from_slice, PipelineSet};
use crate::envelope::Envelope;
use crate::error::{StorageError, StoreError};
use crate::storage::BlobStorage;

/// Name of the configuration blob.
pub const CONFIG_BLOB: &str = "pipelines.json";

/// Result store over blob storage: configuration in one store, results and
/// error records in another.
pub struct BlobResultStore {
    config: Arc<dyn BlobStorage>,
    results: Arc<dyn BlobStorage>,
}

impl BlobResultStore {
    pub fn new(config: Arc<dyn BlobStorage>, results: Arc<dyn BlobStorage>) -> Self {
        Self { config, results }
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        use crate::storage::MemoryStorage;
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }
}

#[async_trait]
impl ResultStore for BlobResultStore {
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let id = stored_id(envelope)?;
        let body = serde_json::to_vec(envelope)?;
        self.results
            .upload(&body, &result_key(&envelope.pipeline_name, id))
            .await?;
        Ok(())
    }

    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        let body = serde_json::to_vec(record)?;
        self.results.upload(&body, &record.key()).await?;
        Ok(())
    }

    async fn get_config(&self) -> Result<PipelineSet, StoreError> {
        let bytes = match self.config.get_buffer(CONFIG_BLOB).await {
            Ok(bytes) => bytes,
            Err(StorageError::NotFound { .. }) => return Err(StoreError::MissingConfig),
            Err(e) => return Err(e.into()),
        };
        Ok(load_pipelines_from_slice(&bytes)?)
    }

    async fn get_by_id(&self, id: &str, pipeline: &str) -> Result<Envelope, StoreError> {
        let bytes = self
            .results
            .get_buffer(&result_key(pipeline, id))
            .await
            .map_err(|e| not_found_as(e, pipeline, id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn delete_by_id(&self, id: &str, pipeline: &str) -> Result<(), StoreError> {
        self.results
            .delete(&result_key(pipeline, id))
            .await
            .map_err(|e| not_found_as(e, pipeline, id))
    }
}

fn not_found_as(error: StorageError, pipeline: &str, id: &str) -> StoreError {
    match error {
        StorageError::NotFound { .. } => StoreError::NotFound {
            pipeline: pipeline.to_string(),
            id: id.to_string(),
        },
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> (Arc<MemoryStorage>, Arc<MemoryStorage>, BlobResultStore) {
        let config = Arc::new(MemoryStorage::new());
        let results = Arc::new(MemoryStorage::new());
        let store = BlobResultStore::new(config.clone(), results.clone());
        (config, results, store)
    }

    fn stored_envelope(id: &str) -> Envelope {
        let mut envelope = Envelope::placeholder(Some(&format!("{}.pdf", id)), "invoices");
        envelope.kind = "fields".to_string();
        envelope
            .record_result(1, "ocr", "ocr-text", json!("text"))
            .unwrap();
        envelope
    }

    #[tokio::test]
    async fn test_create_and_get_by_id() {
        let (_, results, store) = store();
        store.create(&stored_envelope("a")).await.unwrap();

        assert!(results.contains("invoices/a.json"));
        let loaded = store.get_by_id("a", "invoices").await.unwrap();
        assert_eq!(loaded.kind, "fields");
        assert_eq!(loaded.result("ocr"), Some(&json!("text")));
    }

    #[tokio::test]
    async fn test_get_by_original_filename() {
        let (_, _, store) = store();
        let mut envelope = Envelope::placeholder(Some("in/Invoice:01.pdf"), "invoices");
        envelope.kind = "fields".to_string();
        store.create(&envelope).await.unwrap();

        let loaded = store
            .get_by_original_filename("uploads/Invoice:01.pdf", "invoices")
            .await
            .unwrap();
        assert_eq!(loaded.id.as_deref(), Some("Invoice_01"));
        assert!(matches!(
            store.get_by_original_filename("Invoice:01.pdf", "receipts").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_result_is_not_found() {
        let (_, _, store) = store();
        let err = store.get_by_id("a", "invoices").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.delete_by_id("a", "invoices").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_create_without_id_fails() {
        let (_, _, store) = store();
        let err = store.create(&Envelope::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingId { .. }));
    }

    #[tokio::test]
    async fn test_get_config() {
        let (config, _, store) = store();
        assert!(matches!(
            store.get_config().await,
            Err(StoreError::MissingConfig)
        ));

        config
            .upload(
                br#"{"pipelines":[{"name":"invoices","stages":[{"name":"ocr"}]}]}"#,
                CONFIG_BLOB,
            )
            .await
            .unwrap();
        let pipelines = store.get_config().await.unwrap();
        assert!(pipelines.find("invoices").is_some());
    }

    #[tokio::test]
    async fn test_create_error_uses_error_key() {
        let (_, results, store) = store();
        let record = ErrorRecord {
            envelope: Envelope::placeholder(Some("a.pdf"), "invoices"),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        store.create_error(&record).await.unwrap();
        assert!(results.contains("error/invoices/a_error.json"));
    }
}
