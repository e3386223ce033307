// Vibe-Forge: Progress Events
// Fire-and-forget progress telemetry from the orchestrators to the UI layer.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;

/// One progress event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Emitting orchestrator (e.g. "plan", "code", "debug")
    pub orchestrator: String,
    /// Phase tag (e.g. "analyzing", "planning", "attempt")
    pub phase: String,
    /// Human-readable message
    pub message: String,
    pub timestamp: String,
}

impl ProgressEvent {
    pub fn new(orchestrator: &str, phase: &str, message: impl Into<String>) -> Self {
        Self {
            orchestrator: orchestrator.to_string(),
            phase: phase.to_string(),
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Receiver of progress events. Implementations must not block.
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&self, _event: ProgressEvent) {}
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Non-blocking send; a dropped receiver is ignored
impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
    fn on_event(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}

/// Emits events on behalf of one orchestrator, isolating sink failures
#[derive(Clone)]
pub struct ProgressReporter {
    orchestrator: &'static str,
    sink: Arc<dyn ProgressSink>,
}

impl ProgressReporter {
    pub fn new(orchestrator: &'static str, sink: Arc<dyn ProgressSink>) -> Self {
        Self { orchestrator, sink }
    }

    pub fn silent(orchestrator: &'static str) -> Self {
        Self::new(orchestrator, Arc::new(NullSink))
    }

    /// Same sink, different orchestrator tag
    pub fn for_orchestrator(&self, orchestrator: &'static str) -> Self {
        Self { orchestrator, sink: self.sink.clone() }
    }

    pub fn emit(&self, phase: &str, message: impl Into<String>) {
        let event = ProgressEvent::new(self.orchestrator, phase, message);
        log::debug!("[{}:{}] {}", event.orchestrator, event.phase, event.message);

        let sink = &self.sink;
        if catch_unwind(AssertUnwindSafe(|| sink.on_event(event))).is_err() {
            log::warn!("Progress sink panicked; event dropped");
        }
    }
}
