use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::Envelope;
use crate::error::StageError;

use super::{Stage, CHANGE_OUTPUT};

/// Switches the working output to an earlier result.
///
/// With `{"to": "<resultName>"}` in the stage config the named result is
/// selected; without it the most recent result is. The payload becomes that
/// result and the envelope kind becomes the kind recorded for it, so later
/// stages can consume an output other than the one just produced.
pub struct ChangeOutputStage {
    accepted: Vec<String>,
}

impl ChangeOutputStage {
    pub fn new() -> Self {
        Self {
            accepted: Vec::new(),
        }
    }

    fn target(envelope: &Envelope) -> Result<Option<String>, StageError> {
        let Some(config) = envelope.stage_specific_config.as_ref() else {
            return Ok(None);
        };
        match config.get("to") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(other) => Err(StageError::InvalidConfig {
                stage: CHANGE_OUTPUT.to_string(),
                message: format!("'to' must be a result name, got {}", other),
            }),
        }
    }
}

impl Default for ChangeOutputStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Stage for ChangeOutputStage {
    fn name(&self) -> &str {
        CHANGE_OUTPUT
    }

    fn accepted_input_kinds(&self) -> &[String] {
        &self.accepted
    }

    async fn process(
        &self,
        mut envelope: Envelope,
        stage_index: usize,
    ) -> Result<Envelope, StageError> {
        let target = Self::target(&envelope)?;

        let (name, kind, value) = {
            let selected = match target.as_deref() {
                Some(name) => envelope.find_result(name),
                None => envelope.latest_result(),
            };
            let (entry, value) = selected.ok_or_else(|| StageError::MissingResult {
                stage: CHANGE_OUTPUT.to_string(),
                name: target.clone().unwrap_or_else(|| "<latest>".to_string()),
            })?;
            (entry.name.clone(), entry.kind.clone(), value.clone())
        };

        tracing::debug!(stage_index, result = %name, kind = %kind, "Changing output");

        envelope.payload = envelope.payload_for(&name, &value)?;
        envelope.kind = kind;
        Ok(envelope)
    }
}
