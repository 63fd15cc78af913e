use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::envelope::{Envelope, Payload};
use crate::ident;
use crate::queue::{ContinuationMessage, MessageQueue, TriggerMessage};
use crate::sink::ResultSink;
use crate::stage;

use super::error::EngineError;
use super::progress::{NoopProgress, ProgressEvent, ProgressReporter, RunPhase};
use super::resolver::{PipelineConfig, StageDescriptor};

/// Terminal state of a run that did not fail.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every stage ran. The envelope has not been stored yet.
    Completed(Envelope),
    /// A stage started a long-running job. The checkpoint is stored and the
    /// continuation message has been sent.
    Suspended {
        envelope: Envelope,
        message: ContinuationMessage,
    },
}

impl RunOutcome {
    pub fn envelope(&self) -> &Envelope {
        match self {
            RunOutcome::Completed(envelope) => envelope,
            RunOutcome::Suspended { envelope, .. } => envelope,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended { .. })
    }
}

/// Drives envelopes through resolved pipelines.
pub struct Engine {
    sink: Arc<ResultSink>,
    queue: Arc<dyn MessageQueue>,
    progress: Arc<dyn ProgressReporter>,
}

impl Engine {
    pub fn new(sink: Arc<ResultSink>, queue: Arc<dyn MessageQueue>) -> Self {
        Self {
            sink,
            queue,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    pub fn queue(&self) -> &dyn MessageQueue {
        self.queue.as_ref()
    }

    /// Ingests an uploaded file and runs it from the first stage.
    pub async fn process_file(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        config: &PipelineConfig,
    ) -> Result<RunOutcome, EngineError> {
        let envelope = Envelope::ingest(filename, bytes, &config.name)?;
        self.run(envelope, config, 1).await
    }

    /// Runs stages `start_index..=config.len()` (1-based) over `envelope`.
    ///
    /// An envelope without an id gets one derived from its filename before
    /// the first stage. A start index one past the last stage runs nothing
    /// and completes.
    pub async fn run(
        &self,
        mut envelope: Envelope,
        config: &PipelineConfig,
        start_index: usize,
    ) -> Result<RunOutcome, EngineError> {
        if envelope.id.is_none() {
            envelope.id = Some(ident::derive_id_or_random(envelope.filename.as_deref()));
        }

        let span = info_span!(
            "pipeline",
            id = envelope.id.as_deref().unwrap_or("-"),
            filename = envelope.filename.as_deref().map(ident::strip_path).unwrap_or("-"),
            pipeline = %config.name,
        );

        let document_id = envelope.id.clone();
        let result = self
            .run_stages(envelope, config, start_index)
            .instrument(span)
            .await;

        if let Err(e) = &result {
            self.progress.report(ProgressEvent {
                document_id,
                pipeline: config.name.clone(),
                phase: RunPhase::Failed {
                    error: e.to_string(),
                },
            });
        }
        result
    }

    async fn run_stages(
        &self,
        mut envelope: Envelope,
        config: &PipelineConfig,
        start_index: usize,
    ) -> Result<RunOutcome, EngineError> {
        if start_index == 0 || start_index > config.len() + 1 {
            return Err(EngineError::InvalidStartIndex {
                index: start_index,
                pipeline: config.name.clone(),
                stages: config.len(),
            });
        }

        // Resumed envelopes come from the store or the queue without a payload.
        if start_index > 1 && envelope.payload == Payload::Empty {
            envelope.restore_payload()?;
        }

        info!(start_index, stages = config.len(), "Starting pipeline run");

        for (position, descriptor) in config.stages.iter().enumerate().skip(start_index - 1) {
            let index = position + 1;
            self.validate(&envelope, descriptor)?;
            self.report(&envelope, config, RunPhase::StageStarted {
                index,
                stage: descriptor.name.clone(),
            });

            let output = self.invoke(&envelope, descriptor, index).await?;
            envelope = envelope.carry_forward(output);

            self.report(&envelope, config, RunPhase::StageCompleted {
                index,
                stage: descriptor.name.clone(),
                kind: envelope.kind.clone(),
            });

            if envelope.is_async() {
                return self.suspend(envelope, config, index, descriptor).await;
            }
        }

        info!(kind = %envelope.kind, results = envelope.aggregated_results.len(), "Pipeline run completed");
        self.report(&envelope, config, RunPhase::Completed);
        Ok(RunOutcome::Completed(envelope))
    }

    fn validate(&self, envelope: &Envelope, descriptor: &StageDescriptor) -> Result<(), EngineError> {
        if stage::is_pass_through(&descriptor.name) || descriptor.accepts(&envelope.kind) {
            return Ok(());
        }
        warn!(
            stage = %descriptor.name,
            kind = %envelope.kind,
            "Envelope type not accepted by stage"
        );
        Err(EngineError::InvalidInputType {
            kind: envelope.kind.clone(),
            stage: descriptor.name.clone(),
        })
    }

    async fn invoke(
        &self,
        envelope: &Envelope,
        descriptor: &StageDescriptor,
        index: usize,
    ) -> Result<Envelope, EngineError> {
        let input = envelope.for_stage(descriptor.stage_specific_config.clone());
        let span = info_span!("stage", index, stage = %descriptor.name);

        descriptor
            .stage
            .process(input, index)
            .instrument(span)
            .await
            .map_err(|source| EngineError::StageInvocation {
                stage: descriptor.name.clone(),
                source,
            })
    }

    async fn suspend(
        &self,
        mut envelope: Envelope,
        config: &PipelineConfig,
        index: usize,
        descriptor: &StageDescriptor,
    ) -> Result<RunOutcome, EngineError> {
        envelope.drop_buffer();
        let stored = self.sink.store(envelope).await?;

        let message = ContinuationMessage::for_envelope(&stored)?;
        self.queue
            .send_message(TriggerMessage::Continuation(message.clone()))
            .await?;

        debug!(stage = %descriptor.name, id = %message.id, "Continuation queued");
        info!(index, "Pipeline run suspended for async completion");
        self.report(&stored, config, RunPhase::Suspended {
            index,
            stage: descriptor.name.clone(),
        });

        Ok(RunOutcome::Suspended {
            envelope: stored,
            message,
        })
    }

    fn report(&self, envelope: &Envelope, config: &PipelineConfig, phase: RunPhase) {
        self.progress.report(ProgressEvent {
            document_id: envelope.id.clone(),
            pipeline: config.name.clone(),
            phase,
        });
    }
}
