//! Typed events the core pushes to the embedding UI layer.
//!
//! The UI is an external collaborator: it subscribes and renders, the
//! core never waits on it. Emitting with no subscribers is fine.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::api::types::BatchStats;
use crate::capture::{CaptureStats, TriggerKind};
use crate::jobs::{SessionAnalysisStatus, TrackStatus};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BatchEndReason {
    /// Every enqueued session reached a terminal state.
    Completed,
    /// The server reported `is_running = false`.
    ServerStopped,
    /// The local polling budget ran out before the fleet settled.
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CoreEvent {
    CaptureUploaded {
        session_id: String,
        capture_id: String,
        trigger: TriggerKind,
        byte_size: usize,
    },
    CaptureFailed {
        session_id: String,
        trigger: TriggerKind,
        message: String,
    },
    CaptureTeardown {
        session_id: String,
        stats: CaptureStats,
        orphaned: usize,
    },
    AnalysisStatusChanged {
        session_id: String,
        combined: SessionAnalysisStatus,
        phq: TrackStatus,
        llm: TrackStatus,
    },
    AnalysisResolved {
        session_id: String,
        combined: SessionAnalysisStatus,
        phq: TrackStatus,
        llm: TrackStatus,
    },
    AnalysisTimedOut {
        session_id: String,
        phq: TrackStatus,
        llm: TrackStatus,
    },
    BatchProgress {
        percent: f64,
        total: u32,
        stats: BatchStats,
        is_running: bool,
    },
    BatchFinished {
        reason: BatchEndReason,
        percent: f64,
        total: u32,
        stats: BatchStats,
    },
    /// Periodic hint that the session table should be re-fetched so the
    /// UI reflects individual completions, not just the aggregate bar.
    SessionsRefreshRequested,
    FlowAdvanced {
        assessment_id: String,
        cursor: usize,
        total: usize,
    },
    AssessmentSubmitted {
        assessment_id: String,
        answers: usize,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CoreEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
