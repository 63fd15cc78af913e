use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::PipelineSet;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/pipelines-v1.json");

pub fn load_pipelines<P: AsRef<Path>>(path: P) -> Result<PipelineSet, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_pipelines_from_str(&content)
}

pub fn load_pipelines_from_str(content: &str) -> Result<PipelineSet, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    load_pipelines_from_value(json_value)
}

pub fn load_pipelines_from_slice(content: &[u8]) -> Result<PipelineSet, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_slice(content)?;
    load_pipelines_from_value(json_value)
}

pub fn load_pipelines_from_value(json_value: serde_json::Value) -> Result<PipelineSet, ConfigError> {
    validate_schema(&json_value)?;

    let pipelines: PipelineSet = serde_json::from_value(json_value)?;

    validate_pipelines(&pipelines)?;

    Ok(pipelines)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_pipelines(pipelines: &PipelineSet) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for pipeline in &pipelines.pipelines {
        if pipeline.name.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "Pipeline name must not be blank".to_string(),
            });
        }
        if !names.insert(pipeline.name.as_str()) {
            return Err(ConfigError::DuplicatePipeline {
                name: pipeline.name.clone(),
            });
        }
        if let Some(stage) = pipeline.stages.iter().find(|s| s.name.trim().is_empty()) {
            return Err(ConfigError::Validation {
                message: format!(
                    "Pipeline '{}' has a stage with a blank name ({:?})",
                    pipeline.name, stage.name
                ),
            });
        }
    }

    Ok(())
}
