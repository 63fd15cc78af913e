//! Host settings layered from an optional file and `DOCPIPE__*` environment
//! variables over built-in defaults.

use std::path::{Path, PathBuf};

use ::config::{Config as ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

/// Default similarity index name.
pub const DEFAULT_INDEX_NAME: &str = "bpaindexfilterada";
/// Default embedding dimension of the similarity index.
pub const DEFAULT_INDEX_DIMENSION: usize = 1024;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub index: IndexSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Root of uploaded documents, laid out as `{pipeline}/{filename}`.
    #[serde(default = "default_documents_dir")]
    pub documents_dir: PathBuf,
    /// Root of stored results and error records.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Directory holding `pipelines.json`.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            documents_dir: default_documents_dir(),
            results_dir: default_results_dir(),
            config_dir: default_config_dir(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("data/documents")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("data/results")
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("data/config")
}

/// When `path` is set, results are kept in SQLite instead of JSON blobs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_index_dimension")]
    pub dimension: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_index_name(),
            dimension: DEFAULT_INDEX_DIMENSION,
        }
    }
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_index_dimension() -> usize {
    DEFAULT_INDEX_DIMENSION
}

impl Settings {
    /// Loads settings from `path` (or `docpipe.{toml,json,yaml}` in the
    /// working directory when absent) and the environment.
    ///
    /// Environment keys use `__` between levels, e.g.
    /// `DOCPIPE__INDEX__ENABLED=true`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("docpipe").required(false),
        };

        let settings = ConfigBuilder::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("DOCPIPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.storage.documents_dir, PathBuf::from("data/documents"));
        assert!(settings.database.path.is_none());
        assert!(!settings.index.enabled);
        assert_eq!(settings.index.name, DEFAULT_INDEX_NAME);
        assert_eq!(settings.index.dimension, 1024);
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "storage": { "results_dir": "/srv/results" },
                "database": { "path": "/srv/docpipe.db" },
                "index": { "enabled": true, "dimension": 8 }
            }"#,
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.storage.results_dir, PathBuf::from("/srv/results"));
        assert_eq!(settings.storage.config_dir, PathBuf::from("data/config"));
        assert_eq!(settings.database.path, Some(PathBuf::from("/srv/docpipe.db")));
        assert!(settings.index.enabled);
        assert_eq!(settings.index.dimension, 8);
        assert_eq!(settings.index.name, DEFAULT_INDEX_NAME);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let result = Settings::load(Some(Path::new("/nonexistent/docpipe.toml")));
        assert!(matches!(result, Err(ConfigError::Settings(_))));
    }
}
