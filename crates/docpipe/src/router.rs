//! Routing of continuation signals to the handler that completes a pending
//! external job.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::engine::EngineError;
use crate::envelope::Envelope;
use crate::error::StageError;
use crate::queue::{MessageQueue, TriggerMessage};
use crate::sink::ResultSink;

/// Families of long-running external jobs, in classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncKind {
    SpeechToText,
    FormRecognition,
    TextAnalytics,
}

impl AsyncKind {
    pub const ALL: [AsyncKind; 3] = [
        AsyncKind::SpeechToText,
        AsyncKind::FormRecognition,
        AsyncKind::TextAnalytics,
    ];

    /// Result names whose pending value identifies this family.
    pub fn result_names(self) -> &'static [&'static str] {
        match self {
            AsyncKind::SpeechToText => &["speechToText"],
            AsyncKind::FormRecognition => &[
                "generalDocument",
                "layout",
                "invoice",
                "businessCard",
                "identity",
                "receipt",
                "taxw2",
                "customFormRec",
                "ocrContainer",
                "ocr",
            ],
            AsyncKind::TextAnalytics => &[
                "extractSummary",
                "analyzeSentiment",
                "extractKeyPhrases",
                "multiCategoryClassify",
                "recognizeCustomEntities",
                "recognizeEntities",
                "recognizeLinkedEntities",
                "recognizePiiEntities",
                "healthCare",
                "singleCategoryClassify",
            ],
        }
    }

    /// Finds the pending job in `envelope`: the first result, by family order,
    /// whose value carries a `location` to poll.
    pub fn classify(envelope: &Envelope) -> Option<(AsyncKind, &'static str)> {
        Self::ALL.into_iter().find_map(|kind| {
            kind.result_names()
                .iter()
                .find(|name| is_pending(envelope, name))
                .map(|name| (kind, *name))
        })
    }
}

impl fmt::Display for AsyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AsyncKind::SpeechToText => "speech-to-text",
            AsyncKind::FormRecognition => "form-recognition",
            AsyncKind::TextAnalytics => "text-analytics",
        };
        f.write_str(name)
    }
}

fn is_pending(envelope: &Envelope, name: &str) -> bool {
    envelope
        .result(name)
        .and_then(|value| value.get("location"))
        .is_some_and(|location| !location.is_null())
}

/// The message that resumes a pipeline after `result_name` has completed:
/// the stage after the one that recorded it.
pub fn resume_after(envelope: Envelope, result_name: &str) -> Option<TriggerMessage> {
    let (entry, _) = envelope.find_result(result_name)?;
    let index = entry.index + 1;
    Some(TriggerMessage::Resume { index, envelope })
}

/// Completes one family of external jobs.
///
/// A handler polls the job, records its output with
/// [`Envelope::complete_result`], stores the envelope through the sink and
/// usually queues a resume message (see [`resume_after`]).
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn complete(
        &self,
        envelope: Envelope,
        result_name: &str,
        sink: &ResultSink,
        queue: &dyn MessageQueue,
    ) -> Result<(), StageError>;
}

#[derive(Default)]
pub struct AsyncRouter {
    handlers: HashMap<AsyncKind, Arc<dyn CompletionHandler>>,
}

impl AsyncRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(mut self, kind: AsyncKind, handler: Arc<dyn CompletionHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Invokes exactly one completion handler for the envelope's pending job.
    pub async fn dispatch(
        &self,
        envelope: Envelope,
        sink: &ResultSink,
        queue: &dyn MessageQueue,
    ) -> Result<AsyncKind, EngineError> {
        let Some((kind, result_name)) = AsyncKind::classify(&envelope) else {
            warn!(
                id = envelope.id.as_deref().unwrap_or("-"),
                "Continuation matches no pending async result"
            );
            return Err(EngineError::UnrecognizedAsyncKind {
                filename: envelope
                    .filename
                    .clone()
                    .or_else(|| envelope.id.clone())
                    .unwrap_or_default(),
            });
        };

        let handler = self
            .handlers
            .get(&kind)
            .ok_or_else(|| EngineError::NoCompletionHandler {
                kind: kind.to_string(),
            })?;

        info!(kind = %kind, result = result_name, "Dispatching async completion");
        handler
            .complete(envelope, result_name, sink, queue)
            .await
            .map_err(|source| EngineError::StageInvocation {
                stage: result_name.to_string(),
                source,
            })?;

        Ok(kind)
    }
}
