//! The message entry point: one routing decision per inbound message, then
//! the engine or the async router, then the result sink.

use std::sync::Arc;

use tracing::{error, info, info_span, Instrument};

use crate::engine::{Engine, EngineError, PipelineResolver, RunOutcome};
use crate::envelope::{kinds, Envelope};
use crate::ident;
use crate::queue::{ContinuationMessage, TriggerMessage};
use crate::router::{AsyncKind, AsyncRouter};
use crate::storage::BlobStorage;

/// Marker preceding the blob path in storage event subjects.
pub const BLOB_SUBJECT_MARKER: &str = "/documents/blobs/";

/// What an inbound message asks for.
#[derive(Debug, Clone)]
pub enum Route {
    /// Run a stored upload through its pipeline from the first stage.
    Ingest { pipeline: String, path: String },
    /// Complete a pending external job.
    Continue { id: String, pipeline: String },
    /// Re-enter a pipeline at `index`.
    Resume { index: usize, envelope: Envelope },
}

impl Route {
    /// Maps every message shape to exactly one route.
    ///
    /// Storage events and uploads both become `Ingest`; the pipeline is the
    /// first segment of the storage path in either case.
    pub fn from_message(message: TriggerMessage) -> Result<Route, EngineError> {
        match message {
            TriggerMessage::Resume { index, envelope } => Ok(Route::Resume { index, envelope }),
            TriggerMessage::Continuation(ContinuationMessage { id, pipeline, kind, .. }) => {
                if kind != kinds::ASYNC_TRANSACTION {
                    return Err(invalid(format!(
                        "continuation for '{}' has type '{}', expected '{}'",
                        id,
                        kind,
                        kinds::ASYNC_TRANSACTION
                    )));
                }
                Ok(Route::Continue { id, pipeline })
            }
            TriggerMessage::StorageEvent { subject } => {
                let path = subject
                    .split_once(BLOB_SUBJECT_MARKER)
                    .map(|(_, path)| path)
                    .ok_or_else(|| invalid(format!("subject '{}' names no document blob", subject)))?;
                Route::ingest(path)
            }
            TriggerMessage::Upload(upload) => {
                let filename = ident::sanitize_upload_name(ident::strip_path(&upload.filename));
                Route::ingest(&format!("{}/{}", upload.pipeline, filename))
            }
        }
    }

    fn ingest(path: &str) -> Result<Route, EngineError> {
        match path.split_once('/') {
            Some((pipeline, rest)) if !pipeline.is_empty() && !rest.is_empty() => Ok(Route::Ingest {
                pipeline: pipeline.to_string(),
                path: path.to_string(),
            }),
            _ => Err(invalid(format!("storage path '{}' has no pipeline prefix", path))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Route::Ingest { .. } => "ingest",
            Route::Continue { .. } => "continue",
            Route::Resume { .. } => "resume",
        }
    }

    /// The envelope an error record is written for if this route fails.
    fn failure_envelope(&self) -> Envelope {
        match self {
            Route::Ingest { pipeline, path } => Envelope::placeholder(Some(path), pipeline),
            Route::Continue { id, pipeline } => Envelope {
                id: Some(id.clone()),
                ..Envelope::placeholder(None, pipeline)
            },
            Route::Resume { envelope, .. } => envelope.clone(),
        }
    }
}

fn invalid(reason: String) -> EngineError {
    EngineError::InvalidMessage { reason }
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    /// The run finished and its envelope was stored.
    Completed(Envelope),
    /// The run suspended; its checkpoint was stored by the engine.
    Suspended {
        envelope: Envelope,
        message: ContinuationMessage,
    },
    /// A completion handler took over the continuation.
    Dispatched(AsyncKind),
}

pub struct Trigger {
    resolver: PipelineResolver,
    engine: Engine,
    router: AsyncRouter,
    documents: Arc<dyn BlobStorage>,
}

impl Trigger {
    pub fn new(
        resolver: PipelineResolver,
        engine: Engine,
        router: AsyncRouter,
        documents: Arc<dyn BlobStorage>,
    ) -> Self {
        Self {
            resolver,
            engine,
            router,
            documents,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Handles one inbound message. Failures are recorded through the sink's
    /// error path and then returned.
    pub async fn handle(&self, message: TriggerMessage) -> Result<TriggerOutcome, EngineError> {
        let route = match Route::from_message(message) {
            Ok(route) => route,
            Err(e) => {
                error!(error = %e, "Rejected trigger message");
                return Err(e);
            }
        };

        let failure_envelope = route.failure_envelope();
        let span = info_span!("trigger", route = route.name());
        match self.execute(route).instrument(span).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.record_failure(&failure_envelope, &e).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, route: Route) -> Result<TriggerOutcome, EngineError> {
        let sink = self.engine.sink();
        match route {
            Route::Ingest { pipeline, path } => {
                let pipelines = sink.results().get_config().await?;
                let config = self.resolver.resolve(&pipelines, &pipeline)?;
                let bytes = self.documents.get_buffer(&path).await?;
                info!(pipeline = %pipeline, filename = ident::strip_path(&path), "Processing upload");

                let outcome = self
                    .engine
                    .process_file(ident::strip_path(&path), bytes, &config)
                    .await?;
                self.finish(outcome).await
            }
            Route::Continue { id, pipeline } => {
                let envelope = sink.results().get_by_id(&id, &pipeline).await?;
                let kind = self
                    .router
                    .dispatch(envelope, sink, self.engine.queue())
                    .await?;
                Ok(TriggerOutcome::Dispatched(kind))
            }
            Route::Resume { index, envelope } => {
                let pipelines = sink.results().get_config().await?;
                let config = self.resolver.resolve(&pipelines, &envelope.pipeline_name)?;
                let outcome = self.engine.run(envelope, &config, index).await?;
                self.finish(outcome).await
            }
        }
    }

    async fn finish(&self, outcome: RunOutcome) -> Result<TriggerOutcome, EngineError> {
        match outcome {
            RunOutcome::Completed(envelope) => {
                let stored = self.engine.sink().store(envelope).await?;
                Ok(TriggerOutcome::Completed(stored))
            }
            RunOutcome::Suspended { envelope, message } => {
                Ok(TriggerOutcome::Suspended { envelope, message })
            }
        }
    }

    async fn record_failure(&self, envelope: &Envelope, failure: &EngineError) {
        if let Err(e) = self
            .engine
            .sink()
            .store_error(envelope, &failure.to_string())
            .await
        {
            error!(error = %e, original = %failure, "Failed to record error");
        }
    }
}
