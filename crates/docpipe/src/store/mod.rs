//! Result store collaborator: persisted envelopes, error records and the
//! global pipeline configuration.

pub mod blob;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PipelineSet;
use crate::envelope::Envelope;
use crate::error::StoreError;
use crate::ident::derive_id;

pub use blob::BlobResultStore;
pub use sqlite::SqliteResultStore;

/// Key of a stored result: `{pipeline}/{id}.json`.
pub fn result_key(pipeline: &str, id: &str) -> String {
    format!("{}/{}.json", pipeline, id)
}

/// A failed run, persisted for diagnosis. The raw buffer is never kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    /// `error/{pipeline}/{id}_error.json`, falling back to the timestamp in
    /// milliseconds when the envelope has no id.
    pub fn key(&self) -> String {
        let stem = match &self.envelope.id {
            Some(id) => id.clone(),
            None => self.timestamp.timestamp_millis().to_string(),
        };
        format!("error/{}/{}_error.json", self.envelope.pipeline_name, stem)
    }
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Upserts the envelope under `{pipeline}/{id}`. Last writer wins.
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError>;

    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError>;

    async fn get_config(&self) -> Result<PipelineSet, StoreError>;

    async fn get_by_id(&self, id: &str, pipeline: &str) -> Result<Envelope, StoreError>;

    async fn delete_by_id(&self, id: &str, pipeline: &str) -> Result<(), StoreError>;

    /// Looks up the result for an uploaded file by the id derived from its
    /// name, so `in/Invoice:01.pdf` finds `{pipeline}/Invoice_01.json`.
    async fn get_by_original_filename(
        &self,
        filename: &str,
        pipeline: &str,
    ) -> Result<Envelope, StoreError> {
        self.get_by_id(&derive_id(filename), pipeline).await
    }
}

/// The id an envelope is stored under.
pub(crate) fn stored_id(envelope: &Envelope) -> Result<&str, StoreError> {
    envelope
        .id
        .as_deref()
        .ok_or_else(|| StoreError::MissingId {
            pipeline: envelope.pipeline_name.clone(),
        })
}
