use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The global set of named pipelines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub pipelines: Vec<PipelineDefinition>,
}

impl PipelineSet {
    pub fn find(&self, name: &str) -> Option<&PipelineDefinition> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pipelines.iter().map(|p| p.name.as_str())
    }
}

/// A named, ordered list of stage references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    #[serde(default)]
    pub stages: Vec<StageReference>,
}

/// A reference to a catalog capability plus its per-pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReference {
    pub name: String,
    #[serde(
        rename = "serviceSpecificConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stage_specific_config: Option<Value>,
}

impl StageReference {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stage_specific_config: None,
        }
    }

    pub fn with_config(name: &str, config: Value) -> Self {
        Self {
            name: name.to_string(),
            stage_specific_config: Some(config),
        }
    }
}
