use std::path::PathBuf;

use thiserror::Error;

/// Failures of the SQLite result database.
#[derive(Error, Debug)]
pub enum ResultDbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cannot create database directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema step {version} ({name}) failed: {source}")]
    SchemaStep {
        version: u32,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database schema version {found} is newer than this build supports ({supported})")]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("Result database connection poisoned by a panicked writer")]
    Poisoned,
}
