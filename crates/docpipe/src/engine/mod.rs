//! The pipeline execution engine: resolution of named pipelines and the
//! stage executor.

pub mod error;
pub mod executor;
pub mod progress;
pub mod resolver;

pub use error::EngineError;
pub use executor::{Engine, RunOutcome};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter, RunPhase};
pub use resolver::{PipelineConfig, PipelineResolver, StageDescriptor};
