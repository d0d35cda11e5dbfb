//! Job progress events for observability.
//!
//! Emits [`PipelineEvent`]s via a [`tokio::sync::broadcast`] channel so that
//! external observers (CLI progress, loggers, tests) can follow a run without
//! coupling to the runner internals. Durable history goes to the store as
//! `RunEvent`s; these events are fire-and-forget.

use serde::{Deserialize, Serialize};

use outreach_types::PipelineStep;

/// Events emitted during job execution and dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    JobStarted {
        job_id: String,
        run_id: String,
        planned_count: u32,
    },
    JobCompleted {
        job_id: String,
        drafts_created: usize,
        cost_usd: f64,
        duration_ms: u64,
    },
    JobFailed {
        job_id: String,
        step: PipelineStep,
        error: String,
    },
    StepStarted {
        job_id: String,
        step: PipelineStep,
    },
    StepCompleted {
        job_id: String,
        step: PipelineStep,
        duration_ms: u64,
    },
    LeadStaged {
        job_id: String,
        lead_id: String,
        email: String,
    },
    LeadSkipped {
        job_id: String,
        source_url: String,
        reason: String,
    },
    DraftCreated {
        job_id: String,
        draft_id: String,
    },
    DraftSent {
        draft_id: String,
        message_id: Option<String>,
    },
    SendBlocked {
        draft_id: String,
        reasons: Vec<String>,
    },
}

/// Event emitter wrapping a broadcast sender.
#[derive(Clone)]
pub struct EventEmitter {
    sender: tokio::sync::broadcast::Sender<PipelineEvent>,
}

impl EventEmitter {
    /// Create a new emitter with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    ///
    /// If there are no active receivers the event is silently dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}
