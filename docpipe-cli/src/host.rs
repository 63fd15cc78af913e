//! Local collaborators wired from host settings.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use docpipe::engine::{Engine, PipelineResolver};
use docpipe::db::result_repo::{ErrorRow, ResultRow};
use docpipe::ident::{sanitize_upload_name, strip_path};
use docpipe::store::blob::CONFIG_BLOB;
use docpipe::{
    AsyncRouter, BlobResultStore, BlobStorage, ChannelQueue, LocalStorage, MemoryIndex,
    PipelineSet, ResultDb, ResultSink, ResultStore, Settings, SqliteResultStore, StageCatalog,
    Trigger, TriggerMessage,
};

/// Room for the messages one handled message can queue.
const QUEUE_CAPACITY: usize = 64;

/// Where results and the pipeline configuration live.
enum Backend {
    Blob { config: Arc<LocalStorage> },
    Sqlite(SqliteResultStore),
}

pub struct Host {
    documents: Arc<LocalStorage>,
    backend: Backend,
    store: Arc<dyn ResultStore>,
    sink: Arc<ResultSink>,
    queue: Arc<ChannelQueue>,
    queued: Mutex<mpsc::Receiver<TriggerMessage>>,
    catalog: Arc<StageCatalog>,
}

impl Host {
    pub async fn open(settings: &Settings) -> Result<Self> {
        let documents = Arc::new(LocalStorage::new(&settings.storage.documents_dir));

        let (backend, store): (Backend, Arc<dyn ResultStore>) = match &settings.database.path {
            Some(path) => {
                let db = ResultDb::open(path)
                    .with_context(|| format!("Failed to open database {}", path.display()))?;
                let store = SqliteResultStore::new(db);
                (Backend::Sqlite(store.clone()), Arc::new(store))
            }
            None => {
                let config = Arc::new(LocalStorage::new(&settings.storage.config_dir));
                let results = Arc::new(LocalStorage::new(&settings.storage.results_dir));
                let store = BlobResultStore::new(config.clone(), results);
                (Backend::Blob { config }, Arc::new(store))
            }
        };

        let sink = if settings.index.enabled {
            let index = Arc::new(MemoryIndex::new(&settings.index.name));
            let sink = ResultSink::with_index(store.clone(), index);
            sink.ensure_index(&settings.index.name, settings.index.dimension)
                .await
                .context("Failed to create similarity index")?;
            sink
        } else {
            ResultSink::new(store.clone())
        };

        let (queue, queued) = ChannelQueue::new(QUEUE_CAPACITY);

        Ok(Self {
            documents,
            backend,
            catalog: Arc::new(StageCatalog::with_builtins(store.clone())),
            store,
            sink: Arc::new(sink),
            queue: Arc::new(queue),
            queued: Mutex::new(queued),
        })
    }

    pub fn store(&self) -> &dyn ResultStore {
        self.store.as_ref()
    }

    pub fn resolver(&self) -> PipelineResolver {
        PipelineResolver::new(self.catalog.clone())
    }

    /// A trigger over this host's collaborators. Continuations need completion
    /// handlers, which only an embedding host can register.
    pub fn trigger(&self) -> Trigger {
        let engine = Engine::new(self.sink.clone(), self.queue.clone());
        Trigger::new(
            self.resolver(),
            engine,
            AsyncRouter::new(),
            self.documents.clone(),
        )
    }

    /// Stores the pipeline definitions where the trigger reads them.
    pub async fn publish_config(&self, pipelines: &PipelineSet) -> Result<()> {
        match &self.backend {
            Backend::Blob { config } => {
                let body = serde_json::to_vec_pretty(pipelines)?;
                config.upload(&body, CONFIG_BLOB).await?;
            }
            Backend::Sqlite(store) => store.put_config(pipelines).await?,
        }
        info!(pipelines = pipelines.pipelines.len(), "Published pipeline configuration");
        Ok(())
    }

    /// Copies a local file into document storage under `{pipeline}/` and
    /// returns the upload message that runs it.
    pub async fn upload_document(&self, file: &Path, pipeline: &str) -> Result<TriggerMessage> {
        let filename = file
            .file_name()
            .and_then(|name| name.to_str())
            .with_context(|| format!("{} has no usable file name", file.display()))?
            .to_string();
        let bytes = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;

        let key = format!("{}/{}", pipeline, sanitize_upload_name(strip_path(&filename)));
        self.documents.upload(&bytes, &key).await?;

        Ok(TriggerMessage::upload(&filename, pipeline))
    }

    /// Messages queued since the last drain, oldest first.
    pub fn drain_queue(&self) -> Vec<TriggerMessage> {
        let mut messages = Vec::new();
        if let Ok(mut queued) = self.queued.lock() {
            while let Ok(message) = queued.try_recv() {
                messages.push(message);
            }
        }
        messages
    }

    /// Stored results of a pipeline. Only the SQLite store can enumerate.
    pub async fn list_results(&self, pipeline: &str) -> Result<Vec<ResultRow>> {
        match &self.backend {
            Backend::Sqlite(store) => Ok(store.list(pipeline).await?),
            Backend::Blob { .. } => bail!("Listing results needs the SQLite store (database.path)"),
        }
    }

    pub async fn list_errors(&self, pipeline: &str) -> Result<Vec<ErrorRow>> {
        match &self.backend {
            Backend::Sqlite(store) => Ok(store.errors(pipeline).await?),
            Backend::Blob { .. } => bail!("Listing errors needs the SQLite store (database.path)"),
        }
    }
}
