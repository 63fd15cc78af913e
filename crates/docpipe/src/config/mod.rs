pub mod loader;
pub mod schema;
pub mod settings;

pub use loader::{
    load_pipelines, load_pipelines_from_slice, load_pipelines_from_str, load_pipelines_from_value,
};
pub use schema::{PipelineDefinition, PipelineSet, StageReference};
pub use settings::{DatabaseSettings, IndexSettings, Settings, StorageSettings};
