pub mod config;
pub mod db;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod ident;
pub mod index;
pub mod queue;
pub mod router;
pub mod sink;
pub mod stage;
pub mod storage;
pub mod store;
pub mod trigger;

pub use config::{load_pipelines, PipelineDefinition, PipelineSet, Settings, StageReference};
pub use db::{ResultDb, ResultDbError};
pub use engine::{
    Engine, EngineError, PipelineConfig, PipelineResolver, ProgressEvent, ProgressReporter,
    RunOutcome, StageDescriptor,
};
pub use envelope::{Envelope, Payload, ResultIndex};
pub use error::{
    ConfigError, EnvelopeError, IndexError, QueueError, SinkError, StageError, StorageError,
    StoreError,
};
pub use ident::derive_id;
pub use index::{MemoryIndex, NoopIndex, SimilarityIndex};
pub use queue::{
    ChannelQueue, ContinuationMessage, MemoryQueue, MessageQueue, TriggerMessage, UploadMessage,
};
pub use router::{AsyncKind, AsyncRouter, CompletionHandler};
pub use sink::ResultSink;
pub use stage::{Stage, StageCatalog};
pub use storage::{BlobStorage, LocalStorage, MemoryStorage};
pub use store::{BlobResultStore, ErrorRecord, ResultStore, SqliteResultStore};
pub use trigger::{Route, Trigger, TriggerOutcome};
