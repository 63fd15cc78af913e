//! Builders for pipeline definitions and a fully wired in-memory engine.

use std::sync::Arc;

use serde_json::Value;

use docpipe::config::{PipelineDefinition, PipelineSet, StageReference};
use docpipe::engine::{BroadcastProgress, Engine, PipelineConfig, PipelineResolver};
use docpipe::store::blob::CONFIG_BLOB;
use docpipe::{
    AsyncRouter, BlobResultStore, BlobStorage, MemoryQueue, MemoryStorage, ResultSink, Stage,
    StageCatalog, Trigger,
};

pub struct PipelineSetBuilder {
    pipelines: Vec<PipelineDefinition>,
}

impl PipelineSetBuilder {
    pub fn new() -> Self {
        Self {
            pipelines: Vec::new(),
        }
    }

    /// Adds a pipeline of `(stage name, config)` references.
    pub fn pipeline(mut self, name: &str, stages: &[(&str, Option<Value>)]) -> Self {
        self.pipelines.push(PipelineDefinition {
            name: name.to_string(),
            stages: stages
                .iter()
                .map(|(stage, config)| match config {
                    Some(config) => StageReference::with_config(stage, config.clone()),
                    None => StageReference::new(stage),
                })
                .collect(),
        });
        self
    }

    pub fn build(self) -> PipelineSet {
        PipelineSet {
            id: Some("pipelines".to_string()),
            pipelines: self.pipelines,
        }
    }
}

/// An engine over in-memory collaborators, with handles to inspect them.
pub struct Harness {
    pub catalog: Arc<StageCatalog>,
    pub pipelines: PipelineSet,
    pub documents: Arc<MemoryStorage>,
    pub config_storage: Arc<MemoryStorage>,
    pub results: Arc<MemoryStorage>,
    pub queue: Arc<MemoryQueue>,
    pub sink: Arc<ResultSink>,
    pub progress: Arc<BroadcastProgress>,
}

impl Harness {
    pub fn new(stages: Vec<Arc<dyn Stage>>, pipelines: PipelineSet) -> Self {
        let config_storage = Arc::new(MemoryStorage::new());
        let results = Arc::new(MemoryStorage::new());
        let store = Arc::new(BlobResultStore::new(
            config_storage.clone(),
            results.clone(),
        ));

        let catalog = stages
            .into_iter()
            .fold(StageCatalog::builder().builtins(store.clone()), |builder, stage| {
                builder.register(stage)
            })
            .build();

        Self {
            catalog: Arc::new(catalog),
            pipelines,
            documents: Arc::new(MemoryStorage::new()),
            config_storage,
            results,
            queue: Arc::new(MemoryQueue::new()),
            sink: Arc::new(ResultSink::new(store)),
            progress: Arc::new(BroadcastProgress::new(64)),
        }
    }

    pub fn resolver(&self) -> PipelineResolver {
        PipelineResolver::new(self.catalog.clone())
    }

    pub fn resolve(&self, name: &str) -> PipelineConfig {
        self.resolver().resolve(&self.pipelines, name).unwrap()
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.sink.clone(), self.queue.clone()).with_progress(self.progress.clone())
    }

    /// Publishes the pipeline definitions where the trigger reads them.
    pub async fn publish_config(&self) {
        let body = serde_json::to_vec(&self.pipelines).unwrap();
        self.config_storage.upload(&body, CONFIG_BLOB).await.unwrap();
    }

    pub async fn trigger(&self, router: AsyncRouter) -> Trigger {
        self.publish_config().await;
        Trigger::new(self.resolver(), self.engine(), router, self.documents.clone())
    }
}
