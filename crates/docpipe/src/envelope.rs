//! The document envelope: the per-document unit of work threaded through
//! every stage of a pipeline run.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EnvelopeError;
use crate::ident;

/// Envelope kinds with engine-level meaning.
pub mod kinds {
    pub const TEXT: &str = "text";
    pub const JSON: &str = "json";
    /// Output kind of a stage that started a long-running external job.
    pub const ASYNC_TRANSACTION: &str = "async-transaction";
}

/// Result name of the raw uploaded bytes.
pub const BUFFER_RESULT: &str = "buffer";

/// Label given to freshly ingested documents.
pub const FIRST_LABEL: &str = "first";

/// Stage index used for results recorded at ingest, before any stage runs.
pub const INGEST_INDEX: usize = 0;

/// Current primary content of an envelope. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Json(Value),
}

impl Payload {
    /// The payload for a recorded result value. Strings become text.
    pub fn from_result(value: &Value) -> Payload {
        match value {
            Value::String(text) => Payload::Text(text.clone()),
            other => Payload::Json(other.clone()),
        }
    }
}

/// Provenance entry: which stage produced which aggregated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultIndex {
    pub index: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(rename = "pipeline", default)]
    pub pipeline_name: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip)]
    pub payload: Payload,
    #[serde(default)]
    pub aggregated_results: Map<String, Value>,
    #[serde(default)]
    pub results_indexes: Vec<ResultIndex>,
    #[serde(
        rename = "serviceSpecificConfig",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stage_specific_config: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl Envelope {
    /// Builds the envelope for a freshly uploaded file.
    ///
    /// The raw bytes are always recorded as the `buffer` result. Text files
    /// are decoded into a `text` result and JSON files parsed into a `json`
    /// result, which also become the payload.
    pub fn ingest(
        filename: &str,
        bytes: Vec<u8>,
        pipeline_name: &str,
    ) -> Result<Self, EnvelopeError> {
        let clean_name = ident::strip_path(filename).to_string();
        let kind = ident::file_kind(&clean_name);

        let mut envelope = Envelope {
            id: Some(ident::derive_id_or_random(Some(&clean_name))),
            filename: Some(clean_name.clone()),
            pipeline_name: pipeline_name.to_string(),
            label: FIRST_LABEL.to_string(),
            kind: kind.clone(),
            ..Default::default()
        };
        envelope.record_result(
            INGEST_INDEX,
            BUFFER_RESULT,
            &kind,
            Value::String(BASE64_STANDARD.encode(&bytes)),
        )?;

        match kind.as_str() {
            "txt" => {
                let text = String::from_utf8_lossy(&bytes).into_owned();
                envelope.record_result(
                    INGEST_INDEX,
                    kinds::TEXT,
                    kinds::TEXT,
                    Value::String(text.clone()),
                )?;
                envelope.kind = kinds::TEXT.to_string();
                envelope.payload = Payload::Text(text);
            }
            "json" => {
                let value: Value =
                    serde_json::from_slice(&bytes).map_err(|source| EnvelopeError::InvalidJson {
                        filename: clean_name,
                        source,
                    })?;
                envelope.record_result(INGEST_INDEX, kinds::JSON, kinds::JSON, value.clone())?;
                envelope.kind = kinds::JSON.to_string();
                envelope.payload = Payload::Json(value);
            }
            _ => envelope.payload = Payload::Bytes(bytes),
        }

        Ok(envelope)
    }

    /// Minimal envelope carrying only provenance, used for error records when
    /// no real envelope exists yet.
    pub fn placeholder(filename: Option<&str>, pipeline_name: &str) -> Self {
        Envelope {
            id: filename.map(ident::derive_id).filter(|id| !id.is_empty()),
            filename: filename.map(|f| ident::strip_path(f).to_string()),
            pipeline_name: pipeline_name.to_string(),
            ..Default::default()
        }
    }

    pub fn is_async(&self) -> bool {
        self.kind == kinds::ASYNC_TRANSACTION
    }

    pub fn result(&self, name: &str) -> Option<&Value> {
        self.aggregated_results.get(name)
    }

    /// Appends a stage result and its provenance entry.
    ///
    /// Aggregated results are append-only; recording a name twice fails.
    pub fn record_result(
        &mut self,
        stage_index: usize,
        name: &str,
        kind: &str,
        value: Value,
    ) -> Result<(), EnvelopeError> {
        if self.aggregated_results.contains_key(name) {
            return Err(EnvelopeError::DuplicateResult {
                name: name.to_string(),
            });
        }
        self.aggregated_results.insert(name.to_string(), value);
        self.results_indexes.push(ResultIndex {
            index: stage_index,
            name: name.to_string(),
            kind: kind.to_string(),
        });
        Ok(())
    }

    /// Replaces a pending result with its completed value. Used by async
    /// completion handlers once the external job has finished.
    pub fn complete_result(&mut self, name: &str, value: Value) -> Option<Value> {
        self.aggregated_results.insert(name.to_string(), value)
    }

    /// The most recently recorded result that is still present.
    pub fn latest_result(&self) -> Option<(&ResultIndex, &Value)> {
        self.results_indexes
            .iter()
            .rev()
            .find_map(|entry| self.result(&entry.name).map(|value| (entry, value)))
    }

    /// The most recent provenance entry for `name`, if it is still present.
    pub fn find_result(&self, name: &str) -> Option<(&ResultIndex, &Value)> {
        let value = self.result(name)?;
        self.results_indexes
            .iter()
            .rev()
            .find(|entry| entry.name == name)
            .map(|entry| (entry, value))
    }

    /// Decodes the raw upload, if it is still carried.
    pub fn raw_bytes(&self) -> Result<Option<Vec<u8>>, EnvelopeError> {
        match self.result(BUFFER_RESULT).and_then(Value::as_str) {
            Some(encoded) => Ok(Some(BASE64_STANDARD.decode(encoded)?)),
            None => Ok(None),
        }
    }

    /// The payload that selecting result `name` as the working output yields.
    /// The raw upload decodes back to bytes.
    pub fn payload_for(&self, name: &str, value: &Value) -> Result<Payload, EnvelopeError> {
        if name != BUFFER_RESULT {
            return Ok(Payload::from_result(value));
        }
        Ok(self.raw_bytes()?.map(Payload::Bytes).unwrap_or_default())
    }

    /// Rebuilds the payload from the most recent result. Stored and queued
    /// envelopes never carry one.
    pub fn restore_payload(&mut self) -> Result<(), EnvelopeError> {
        let payload = match self.latest_result() {
            Some((entry, value)) => self.payload_for(&entry.name, value)?,
            None => Payload::Empty,
        };
        self.payload = payload;
        Ok(())
    }

    /// Removes the raw upload once a long-running job reference replaces it.
    pub fn drop_buffer(&mut self) -> Option<Value> {
        self.aggregated_results.shift_remove(BUFFER_RESULT)
    }

    /// The envelope handed to a stage: a copy carrying that stage's config.
    pub fn for_stage(&self, stage_specific_config: Option<Value>) -> Envelope {
        Envelope {
            stage_specific_config,
            ..self.clone()
        }
    }

    /// Adopts a stage's output as the new working state.
    ///
    /// `id` and `filename` are forced back to the values held before the
    /// stage ran. Results recorded earlier keep their values and order even if
    /// the stage dropped or rewrote them; new results are appended.
    pub fn carry_forward(self, mut output: Envelope) -> Envelope {
        output.id = self.id;
        output.filename = self.filename;

        let mut results = self.aggregated_results;
        for (name, value) in std::mem::take(&mut output.aggregated_results) {
            results.entry(name).or_insert(value);
        }
        output.aggregated_results = results;

        let mut indexes = self.results_indexes;
        for entry in std::mem::take(&mut output.results_indexes) {
            if !indexes.contains(&entry) {
                indexes.push(entry);
            }
        }
        output.results_indexes = indexes;

        output
    }

    /// The embedding to index: the explicit vector, or the first embedding of
    /// an `openaiEmbeddings` result.
    pub fn embedding(&self) -> Option<Vec<f32>> {
        if let Some(vector) = self.vector.as_ref().filter(|v| !v.is_empty()) {
            return Some(vector.clone());
        }
        let values = self
            .result("openaiEmbeddings")?
            .pointer("/data/0/embedding")?
            .as_array()?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        (!vector.is_empty() && vector.len() == values.len()).then_some(vector)
    }
}
