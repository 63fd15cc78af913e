//! Scripted stage implementations for driving the engine in tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use docpipe::envelope::{kinds, Envelope, Payload};
use docpipe::{Stage, StageError};

/// What a scripted stage does when invoked.
#[derive(Clone)]
pub enum StageScript {
    /// Records `{name: value}` and switches the kind to `output_kind`.
    Produce { output_kind: String, value: Value },
    /// Like `Produce`, but also rewrites `id` and `filename` and drops every
    /// earlier result.
    Tamper { output_kind: String, value: Value },
    /// Starts an external job: records `{name: {"location": ...}}` and
    /// switches the kind to `async-transaction`.
    StartJob,
    Fail(String),
}

pub struct ScriptedStage {
    name: String,
    accepted: Vec<String>,
    script: StageScript,
    calls: AtomicUsize,
    seen_configs: Mutex<Vec<Option<Value>>>,
    seen_payloads: Mutex<Vec<Payload>>,
}

impl ScriptedStage {
    pub fn new(name: &str, accepted: &[&str], script: StageScript) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            accepted: accepted.iter().map(|k| k.to_string()).collect(),
            script,
            calls: AtomicUsize::new(0),
            seen_configs: Mutex::new(Vec::new()),
            seen_payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn producing(name: &str, accepted: &[&str], output_kind: &str) -> Arc<Self> {
        Self::new(
            name,
            accepted,
            StageScript::Produce {
                output_kind: output_kind.to_string(),
                value: json!({ "producedBy": name }),
            },
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_configs(&self) -> Vec<Option<Value>> {
        self.seen_configs.lock().unwrap().clone()
    }

    pub fn seen_payloads(&self) -> Vec<Payload> {
        self.seen_payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_input_kinds(&self) -> &[String] {
        &self.accepted
    }

    async fn process(&self, mut envelope: Envelope, stage_index: usize) -> Result<Envelope, StageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_configs
            .lock()
            .unwrap()
            .push(envelope.stage_specific_config.clone());
        self.seen_payloads
            .lock()
            .unwrap()
            .push(envelope.payload.clone());

        match &self.script {
            StageScript::Produce { output_kind, value } => {
                envelope.record_result(stage_index, &self.name, output_kind, value.clone())?;
                envelope.kind = output_kind.clone();
                envelope.payload = Payload::Json(value.clone());
                Ok(envelope)
            }
            StageScript::Tamper { output_kind, value } => {
                let mut output = Envelope {
                    id: Some("tampered".to_string()),
                    filename: Some("tampered.bin".to_string()),
                    pipeline_name: envelope.pipeline_name.clone(),
                    label: envelope.label.clone(),
                    kind: output_kind.clone(),
                    ..Default::default()
                };
                output.record_result(stage_index, &self.name, output_kind, value.clone())?;
                Ok(output)
            }
            StageScript::StartJob => {
                envelope.record_result(
                    stage_index,
                    &self.name,
                    kinds::ASYNC_TRANSACTION,
                    json!({ "location": format!("https://jobs.example/{}", self.name) }),
                )?;
                envelope.kind = kinds::ASYNC_TRANSACTION.to_string();
                Ok(envelope)
            }
            StageScript::Fail(message) => Err(StageError::Service {
                stage: self.name.clone(),
                message: message.clone(),
            }),
        }
    }
}

/// Erases scripted stages into catalog entries.
pub fn dyn_stages(stages: &[&Arc<ScriptedStage>]) -> Vec<Arc<dyn Stage>> {
    stages
        .iter()
        .map(|stage| Arc::clone(stage) as Arc<dyn Stage>)
        .collect()
}
