//! Stage capabilities and the catalog they are registered in.

pub mod change_output;
pub mod view;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::StageError;
use crate::store::ResultStore;

pub use change_output::ChangeOutputStage;
pub use view::ViewStage;

/// Reserved capability name of the checkpointing view stage.
pub const VIEW: &str = "view";
/// Reserved capability name of the output-switching stage.
pub const CHANGE_OUTPUT: &str = "changeOutput";

/// Returns true for the capabilities that skip input-kind validation.
pub fn is_pass_through(name: &str) -> bool {
    name == VIEW || name == CHANGE_OUTPUT
}

/// One processing capability. Implementations wrap OCR, form recognition,
/// language analysis, embeddings and similar services.
///
/// A stage reads its configuration from `envelope.stage_specific_config` and
/// returns a new envelope value. It may perform network I/O and take
/// arbitrary time; timeouts are the implementation's concern.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    /// Envelope kinds this stage consumes. Empty accepts anything.
    fn accepted_input_kinds(&self) -> &[String];

    async fn process(&self, envelope: Envelope, stage_index: usize)
        -> Result<Envelope, StageError>;
}

/// Immutable registry of stage implementations keyed by capability name.
///
/// Built once at startup and shared read-only across concurrent runs.
pub struct StageCatalog {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl StageCatalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// A catalog holding only the built-in `view` and `changeOutput` stages.
    /// `view` checkpoints into `store`.
    pub fn with_builtins(store: Arc<dyn ResultStore>) -> Self {
        Self::builder().builtins(store).build()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Stage>> {
        self.stages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stages.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stages.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[derive(Default)]
pub struct CatalogBuilder {
    stages: HashMap<String, Arc<dyn Stage>>,
}

impl CatalogBuilder {
    /// Registers the built-in pass-through stages.
    pub fn builtins(self, store: Arc<dyn ResultStore>) -> Self {
        self.register(Arc::new(ViewStage::new(store)))
            .register(Arc::new(ChangeOutputStage::new()))
    }

    /// Registers a stage under its own name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register(mut self, stage: Arc<dyn Stage>) -> Self {
        let name = stage.name().to_string();
        if self.stages.insert(name.clone(), stage).is_some() {
            tracing::warn!(stage = %name, "Stage registered twice, keeping the latest");
        }
        self
    }

    pub fn build(self) -> StageCatalog {
        StageCatalog {
            stages: self.stages,
        }
    }
}
