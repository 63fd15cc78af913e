use thiserror::Error;

use crate::error::{EnvelopeError, QueueError, SinkError, StageError, StorageError, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Pipeline '{name}' is not defined")]
    PipelineNotFound { name: String },

    #[error("Stage '{stage}' does not accept input of type '{kind}'")]
    InvalidInputType { kind: String, stage: String },

    #[error("No pending async result found for '{filename}'")]
    UnrecognizedAsyncKind { filename: String },

    #[error("No completion handler registered for {kind}")]
    NoCompletionHandler { kind: String },

    #[error("Stage '{stage}' failed: {source}")]
    StageInvocation {
        stage: String,
        #[source]
        source: StageError,
    },

    #[error("Start index {index} is outside pipeline '{pipeline}' with {stages} stages")]
    InvalidStartIndex {
        index: usize,
        pipeline: String,
        stages: usize,
    },

    #[error("Invalid trigger message: {reason}")]
    InvalidMessage { reason: String },

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("Storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Result store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Queue failed: {0}")]
    Queue(#[from] QueueError),

    #[error("Persisting results failed: {0}")]
    Sink(#[from] SinkError),
}
