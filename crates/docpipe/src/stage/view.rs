use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::StageError;
use crate::store::ResultStore;

use super::{Stage, VIEW};

/// Checkpoint stage: stores the envelope as it stands so far, then surfaces
/// the most recent result as the payload.
///
/// Accepts any envelope kind and leaves the kind and results untouched.
pub struct ViewStage {
    accepted: Vec<String>,
    store: Arc<dyn ResultStore>,
}

impl ViewStage {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self {
            accepted: Vec::new(),
            store,
        }
    }
}

#[async_trait]
impl Stage for ViewStage {
    fn name(&self) -> &str {
        VIEW
    }

    fn accepted_input_kinds(&self) -> &[String] {
        &self.accepted
    }

    async fn process(
        &self,
        mut envelope: Envelope,
        stage_index: usize,
    ) -> Result<Envelope, StageError> {
        self.store.create(&envelope).await?;
        tracing::debug!(stage_index, id = envelope.id.as_deref().unwrap_or("-"), "Checkpoint stored");

        if envelope.latest_result().is_some() {
            envelope.restore_payload()?;
        }
        Ok(envelope)
    }
}
