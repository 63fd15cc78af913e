use serde::Serialize;
use tokio::sync::broadcast;

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    StageStarted { index: usize, stage: String },
    StageCompleted { index: usize, stage: String, kind: String },
    Suspended { index: usize, stage: String },
    Completed,
    Failed { error: String },
}

/// Emitted by the executor during a run. Payloads and results are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub document_id: Option<String>,
    pub pipeline: String,
    #[serde(flatten)]
    pub phase: RunPhase,
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for hosts that don't observe runs.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Forwards events to a tokio broadcast channel.
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }
}
