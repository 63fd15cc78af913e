use std::path::PathBuf;
use thiserror::Error;

use crate::db::ResultDbError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Duplicate pipeline name '{name}'")]
    DuplicatePipeline { name: String },

    #[error("Failed to load settings: {0}")]
    Settings(#[from] ::config::ConfigError),
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Result '{name}' is already recorded")]
    DuplicateResult { name: String },

    #[error("Document '{filename}' is not valid JSON: {source}")]
    InvalidJson {
        filename: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Envelope has no identifier")]
    MissingId,

    #[error("Raw buffer is not valid base64: {0}")]
    InvalidBuffer(#[from] base64::DecodeError),
}

/// Failure raised by a stage capability or an async completion handler.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Stage '{stage}' failed: {message}")]
    Service { stage: String, message: String },

    #[error("Stage '{stage}' has invalid configuration: {message}")]
    InvalidConfig { stage: String, message: String },

    #[error("Stage '{stage}' requires result '{name}' which is not recorded")]
    MissingResult { stage: String, name: String },

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {path}")]
    NotFound { path: String },

    #[error("Invalid storage path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read blob '{path}': {source}")]
    ReadBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write blob '{path}': {source}")]
    WriteBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete blob '{path}': {source}")]
    DeleteBlob {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Stored result not found: {pipeline}/{id}")]
    NotFound { pipeline: String, id: String },

    #[error("No pipeline configuration is stored")]
    MissingConfig,

    #[error("Cannot store a result without an id in pipeline '{pipeline}'")]
    MissingId { pipeline: String },

    #[error("Failed to serialize stored result: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid pipeline configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Database(#[from] ResultDbError),

    #[error("Background task failed: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Message queue is closed")]
    Closed,

    #[error("Failed to encode queue message: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Similarity index '{name}' has not been created")]
    MissingIndex { name: String },

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Similarity index upsert failed: {0}")]
    Index(#[from] IndexError),
}
