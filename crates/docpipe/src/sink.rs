//! Persistence of terminal and checkpointed envelopes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::envelope::{Envelope, Payload};
use crate::error::SinkError;
use crate::ident;
use crate::index::{NoopIndex, SimilarityIndex};
use crate::store::{ErrorRecord, ResultStore};

pub struct ResultSink {
    store: Arc<dyn ResultStore>,
    index: Arc<dyn SimilarityIndex>,
}

impl ResultSink {
    /// A sink without vector indexing.
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            store,
            index: Arc::new(NoopIndex),
        }
    }

    pub fn with_index(store: Arc<dyn ResultStore>, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { store, index }
    }

    /// The underlying result store, for lookups by id.
    pub fn results(&self) -> &dyn ResultStore {
        self.store.as_ref()
    }

    /// Creates the similarity index the sink upserts into.
    pub async fn ensure_index(&self, name: &str, dimension: usize) -> Result<(), SinkError> {
        self.index.create_index(name, dimension).await?;
        Ok(())
    }

    /// Persists `envelope` under `{pipeline}/{id}` and returns what was
    /// stored.
    ///
    /// A missing id is derived from the filename. The payload is never
    /// stored. When the envelope carries an embedding it is also upserted
    /// into the similarity index.
    pub async fn store(&self, mut envelope: Envelope) -> Result<Envelope, SinkError> {
        let id = match envelope.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => ident::derive_id_or_random(envelope.filename.as_deref()),
        };
        envelope.id = Some(id.clone());
        envelope.payload = Payload::Empty;

        self.store.create(&envelope).await?;
        debug!(id = %id, pipeline = %envelope.pipeline_name, "Result stored");

        if let Some(vector) = envelope.embedding() {
            self.index.upsert(&id, &envelope, &vector).await?;
            debug!(id = %id, dimension = vector.len(), "Embedding indexed");
        }

        Ok(envelope)
    }

    /// Persists an error record for a failed run. The raw buffer is dropped
    /// first.
    pub async fn store_error(&self, envelope: &Envelope, error: &str) -> Result<ErrorRecord, SinkError> {
        let mut envelope = envelope.clone();
        envelope.drop_buffer();
        envelope.payload = Payload::Empty;

        let record = ErrorRecord {
            envelope,
            error: error.to_string(),
            timestamp: Utc::now(),
        };
        warn!(key = %record.key(), error = %error, "Recording failed run");
        self.store.create_error(&record).await?;
        Ok(record)
    }
}
