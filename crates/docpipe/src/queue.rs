//! Messages that drive the trigger, and the queue they travel on.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::envelope::Envelope;
use crate::error::{EnvelopeError, QueueError};

/// Sent when a stage has handed work to a long-running external job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuationMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub id: String,
    pub pipeline: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ContinuationMessage {
    /// Builds the message for a stored, suspended envelope.
    pub fn for_envelope(envelope: &Envelope) -> Result<Self, EnvelopeError> {
        let id = envelope
            .id
            .clone()
            .ok_or(EnvelopeError::MissingId)?;
        Ok(Self {
            filename: envelope.filename.clone(),
            id,
            pipeline: envelope.pipeline_name.clone(),
            label: envelope.label.clone(),
            kind: envelope.kind.clone(),
        })
    }
}

/// A file placed in document storage by the host.
///
/// Unknown fields are refused so that a continuation missing its `id` is not
/// mistaken for an upload and re-run from the start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadMessage {
    pub filename: String,
    pub pipeline: String,
}

/// Everything the trigger accepts. Variants are told apart by their fields,
/// tried in declaration order; storage notifications arrive untagged from
/// outside, so there is no tag to dispatch on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TriggerMessage {
    /// Re-run an envelope's pipeline from `index`.
    Resume { index: usize, envelope: Envelope },
    Continuation(ContinuationMessage),
    /// A storage notification whose subject names the uploaded blob.
    StorageEvent { subject: String },
    Upload(UploadMessage),
}

impl TriggerMessage {
    pub fn upload(filename: &str, pipeline: &str) -> Self {
        TriggerMessage::Upload(UploadMessage {
            filename: filename.to_string(),
            pipeline: pipeline.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, QueueError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn send_message(&self, message: TriggerMessage) -> Result<(), QueueError>;
}

/// Queue backed by a tokio mpsc channel; the host owns the receiver.
pub struct ChannelQueue {
    sender: mpsc::Sender<TriggerMessage>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TriggerMessage>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl MessageQueue for ChannelQueue {
    async fn send_message(&self, message: TriggerMessage) -> Result<(), QueueError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| QueueError::Closed)
    }
}

/// Records every message it is sent.
#[derive(Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<TriggerMessage>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<TriggerMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<TriggerMessage> {
        self.messages
            .lock()
            .map(|mut guard| std::mem::take(&mut *guard))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send_message(&self, message: TriggerMessage) -> Result<(), QueueError> {
        self.messages
            .lock()
            .map_err(|_| QueueError::Closed)?
            .push(message);
        Ok(())
    }
}
