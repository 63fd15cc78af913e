//! Materializes a named pipeline definition into concrete stage descriptors.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::config::PipelineSet;
use crate::stage::{Stage, StageCatalog};

use super::error::EngineError;

/// One resolved step of a run: a catalog capability with the pipeline's
/// configuration for it.
///
/// Descriptors are per-run copies; the shared catalog entry is never touched.
#[derive(Clone)]
pub struct StageDescriptor {
    pub name: String,
    pub accepted_input_kinds: Vec<String>,
    pub stage_specific_config: Option<Value>,
    pub stage: Arc<dyn Stage>,
}

impl StageDescriptor {
    /// Whether an envelope of `kind` may enter this stage. An empty accepted
    /// set accepts anything.
    pub fn accepts(&self, kind: &str) -> bool {
        self.accepted_input_kinds.is_empty() || self.accepted_input_kinds.iter().any(|k| k == kind)
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("accepted_input_kinds", &self.accepted_input_kinds)
            .field("stage_specific_config", &self.stage_specific_config)
            .finish_non_exhaustive()
    }
}

/// A pipeline ready to run. Stage `i` (1-based) is `stages[i - 1]`.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub name: String,
    pub stages: Vec<StageDescriptor>,
}

impl PipelineConfig {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

pub struct PipelineResolver {
    catalog: Arc<StageCatalog>,
}

impl PipelineResolver {
    pub fn new(catalog: Arc<StageCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &StageCatalog {
        &self.catalog
    }

    /// Resolves `name` against `pipelines`.
    ///
    /// Stage references with no catalog entry are skipped with a warning, so
    /// the resolved pipeline may be shorter than its definition.
    pub fn resolve(&self, pipelines: &PipelineSet, name: &str) -> Result<PipelineConfig, EngineError> {
        let definition = pipelines
            .find(name)
            .ok_or_else(|| EngineError::PipelineNotFound {
                name: name.to_string(),
            })?;

        let mut stages = Vec::with_capacity(definition.stages.len());
        for reference in &definition.stages {
            let Some(stage) = self.catalog.get(&reference.name) else {
                warn!(
                    pipeline = %name,
                    stage = %reference.name,
                    "Stage is not in the catalog, skipping"
                );
                continue;
            };

            stages.push(StageDescriptor {
                name: reference.name.clone(),
                accepted_input_kinds: stage.accepted_input_kinds().to_vec(),
                stage_specific_config: reference.stage_specific_config.clone(),
                stage: Arc::clone(stage),
            });
        }

        Ok(PipelineConfig {
            name: definition.name.clone(),
            stages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineDefinition, StageReference};
    use crate::envelope::Envelope;
    use crate::error::StageError;
    use crate::store::BlobResultStore;
    use async_trait::async_trait;
    use serde_json::json;

    struct Fixed(&'static str, Vec<String>);

    #[async_trait]
    impl Stage for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn accepted_input_kinds(&self) -> &[String] {
            &self.1
        }

        async fn process(&self, envelope: Envelope, _: usize) -> Result<Envelope, StageError> {
            Ok(envelope)
        }
    }

    fn resolver() -> PipelineResolver {
        let catalog = StageCatalog::builder()
            .builtins(Arc::new(BlobResultStore::in_memory()))
            .register(Arc::new(Fixed("ocr", vec!["pdf".to_string()])))
            .register(Arc::new(Fixed("extractFields", vec!["text".to_string()])))
            .build();
        PipelineResolver::new(Arc::new(catalog))
    }

    fn pipelines() -> PipelineSet {
        PipelineSet {
            id: None,
            pipelines: vec![PipelineDefinition {
                name: "invoices".to_string(),
                stages: vec![
                    StageReference::new("ocr"),
                    StageReference::new("unknownStage"),
                    StageReference::with_config("extractFields", json!({ "modelId": "m1" })),
                ],
            }],
        }
    }

    #[test]
    fn test_resolve_orders_stages_and_applies_config() {
        let config = resolver().resolve(&pipelines(), "invoices").unwrap();

        assert_eq!(config.name, "invoices");
        let names: Vec<_> = config.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["ocr", "extractFields"]);
        assert_eq!(config.stages[0].accepted_input_kinds, vec!["pdf".to_string()]);
        assert!(config.stages[0].stage_specific_config.is_none());
        assert_eq!(
            config.stages[1].stage_specific_config,
            Some(json!({ "modelId": "m1" }))
        );
    }

    #[test]
    fn test_resolve_unknown_pipeline() {
        let err = resolver().resolve(&pipelines(), "receipts").unwrap_err();
        match err {
            EngineError::PipelineNotFound { name } => assert_eq!(name, "receipts"),
            other => panic!("Expected PipelineNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_descriptor_accepts() {
        let config = resolver().resolve(&pipelines(), "invoices").unwrap();
        assert!(config.stages[0].accepts("pdf"));
        assert!(!config.stages[0].accepts("text"));

        let mut open = config.stages[0].clone();
        open.accepted_input_kinds.clear();
        assert!(open.accepts("anything"));
    }
}
