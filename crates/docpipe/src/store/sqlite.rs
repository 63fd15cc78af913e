use async_trait::async_trait;
use chrono::Utc;

use super::{stored_id, ErrorRecord, ResultStore};
use crate::config::{load_pipelines_from_str, PipelineSet};
use crate::db::result_repo::{self, ErrorRow, ResultRow};
use crate::db::ResultDb;
use crate::envelope::Envelope;
use crate::error::StoreError;

/// Result store over SQLite. Blocking calls run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteResultStore {
    db: ResultDb,
}

impl SqliteResultStore {
    pub fn new(db: ResultDb) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &ResultDb {
        &self.db
    }

    /// Replaces the stored pipeline configuration.
    pub async fn put_config(&self, pipelines: &PipelineSet) -> Result<(), StoreError> {
        let body = serde_json::to_string(pipelines)?;
        let db = self.db.clone();
        run_blocking(move || {
            result_repo::put_config(&db, &body, &Utc::now().to_rfc3339())?;
            Ok(())
        })
        .await
    }

    /// Stored results of one pipeline, ordered by id.
    pub async fn list(&self, pipeline: &str) -> Result<Vec<ResultRow>, StoreError> {
        let db = self.db.clone();
        let pipeline = pipeline.to_string();
        run_blocking(move || Ok(result_repo::list_results(&db, &pipeline)?)).await
    }

    pub async fn errors(&self, pipeline: &str) -> Result<Vec<ErrorRow>, StoreError> {
        let db = self.db.clone();
        let pipeline = pipeline.to_string();
        run_blocking(move || Ok(result_repo::list_errors(&db, &pipeline)?)).await
    }
}

async fn run_blocking<F, T>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn create(&self, envelope: &Envelope) -> Result<(), StoreError> {
        let row = ResultRow {
            pipeline: envelope.pipeline_name.clone(),
            id: stored_id(envelope)?.to_string(),
            filename: envelope.filename.clone(),
            kind: envelope.kind.clone(),
            label: Some(envelope.label.clone()).filter(|l| !l.is_empty()),
            body: serde_json::to_string(envelope)?,
            updated_at: Utc::now().to_rfc3339(),
        };
        let db = self.db.clone();
        run_blocking(move || Ok(result_repo::upsert_result(&db, &row)?)).await
    }

    async fn create_error(&self, record: &ErrorRecord) -> Result<(), StoreError> {
        let row = ErrorRow {
            key: record.key(),
            pipeline: record.envelope.pipeline_name.clone(),
            document_id: record.envelope.id.clone(),
            message: record.error.clone(),
            body: serde_json::to_string(record)?,
            created_at: record.timestamp.to_rfc3339(),
        };
        let db = self.db.clone();
        run_blocking(move || Ok(result_repo::insert_error(&db, &row)?)).await
    }

    async fn get_config(&self) -> Result<PipelineSet, StoreError> {
        let db = self.db.clone();
        let body = run_blocking(move || Ok(result_repo::get_config(&db)?))
            .await?
            .ok_or(StoreError::MissingConfig)?;
        Ok(load_pipelines_from_str(&body)?)
    }

    async fn get_by_id(&self, id: &str, pipeline: &str) -> Result<Envelope, StoreError> {
        let db = self.db.clone();
        let (id, pipeline) = (id.to_string(), pipeline.to_string());
        run_blocking(move || {
            let row = result_repo::get_result(&db, &pipeline, &id)?
                .ok_or(StoreError::NotFound { pipeline, id })?;
            Ok(serde_json::from_str(&row.body)?)
        })
        .await
    }

    async fn delete_by_id(&self, id: &str, pipeline: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let (id, pipeline) = (id.to_string(), pipeline.to_string());
        run_blocking(move || {
            if result_repo::delete_result(&db, &pipeline, &id)? {
                Ok(())
            } else {
                Err(StoreError::NotFound { pipeline, id })
            }
        })
        .await
    }
}
