//! Per-track state for one remote analysis job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::AssessmentKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    NotStarted,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::NotStarted => "not_started",
            TrackStatus::Queued => "queued",
            TrackStatus::Processing => "processing",
            TrackStatus::Completed => "completed",
            TrackStatus::Failed => "failed",
            TrackStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackStatus::Completed | TrackStatus::Failed | TrackStatus::Cancelled
        )
    }

    /// Forward progress order for polled observations.
    fn rank(&self) -> u8 {
        match self {
            TrackStatus::NotStarted => 0,
            TrackStatus::Queued => 1,
            TrackStatus::Processing => 2,
            TrackStatus::Completed | TrackStatus::Failed | TrackStatus::Cancelled => 3,
        }
    }
}

impl std::fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub from: TrackStatus,
    pub to: TrackStatus,
    pub at: DateTime<Utc>,
}

/// One remote long-running job for one (session, assessment kind).
/// Status only moves forward under polling; the operator actions are
/// the sole exceptions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTrack {
    pub session_id: String,
    pub kind: AssessmentKind,
    pub status: TrackStatus,
    pub task_id: Option<String>,
    pub poll_count: u32,
    pub history: Vec<Transition>,
}

impl JobTrack {
    pub fn new(session_id: impl Into<String>, kind: AssessmentKind) -> Self {
        Self {
            session_id: session_id.into(),
            kind,
            status: TrackStatus::NotStarted,
            task_id: None,
            poll_count: 0,
            history: Vec::new(),
        }
    }

    pub fn with_task(mut self, task_id: Option<String>) -> Self {
        self.task_id = task_id;
        self
    }

    fn transition(&mut self, to: TrackStatus) {
        self.history.push(Transition {
            from: self.status,
            to,
            at: Utc::now(),
        });
        self.status = to;
    }

    /// Fold in a polled server status. A stale, lower-ranked response
    /// never moves the track backwards, and a terminal status sticks
    /// until an operator action. Returns whether the status changed.
    pub fn observe(&mut self, status: TrackStatus) -> bool {
        if status == self.status || self.status.is_terminal() {
            return false;
        }
        if status.rank() < self.status.rank() {
            return false;
        }
        self.transition(status);
        true
    }

    /// Remember the remote task identifier once the server assigns one.
    pub fn observe_task(&mut self, task_id: Option<String>) {
        if task_id.is_some() {
            self.task_id = task_id;
        }
    }

    /// Operator `process`: only a fresh (or deleted) track can queue.
    pub fn mark_queued(&mut self) -> bool {
        if self.status == TrackStatus::NotStarted {
            self.transition(TrackStatus::Queued);
            true
        } else {
            false
        }
    }

    /// Operator `cancel`: valid only while processing; anything else is
    /// a no-op (cancelling a completed track has no effect).
    pub fn cancel(&mut self) -> bool {
        if self.status == TrackStatus::Processing {
            self.transition(TrackStatus::Cancelled);
            true
        } else {
            false
        }
    }

    /// Operator `reanalyze`: completed or failed goes back to queued.
    pub fn reanalyze(&mut self) -> bool {
        if matches!(self.status, TrackStatus::Completed | TrackStatus::Failed) {
            self.transition(TrackStatus::Queued);
            true
        } else {
            false
        }
    }

    /// Operator `delete`: a terminal track resets to not_started.
    pub fn delete(&mut self) -> bool {
        if self.status.is_terminal() {
            self.transition(TrackStatus::NotStarted);
            self.task_id = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track() -> JobTrack {
        JobTrack::new("session-1", AssessmentKind::Phq)
    }

    #[test]
    fn observations_move_forward_only() {
        let mut track = track();
        assert!(track.observe(TrackStatus::Queued));
        assert!(track.observe(TrackStatus::Processing));
        // stale response from an earlier poll
        assert!(!track.observe(TrackStatus::Queued));
        assert_eq!(track.status, TrackStatus::Processing);
        assert!(track.observe(TrackStatus::Completed));
        assert_eq!(track.history.len(), 3);
    }

    #[test]
    fn terminal_status_sticks_under_polling() {
        let mut track = track();
        track.observe(TrackStatus::Failed);
        assert!(!track.observe(TrackStatus::Completed));
        assert!(!track.observe(TrackStatus::Processing));
        assert_eq!(track.status, TrackStatus::Failed);
    }

    #[test]
    fn cancel_only_applies_while_processing() {
        let mut track = track();
        assert!(!track.cancel());

        track.observe(TrackStatus::Processing);
        assert!(track.cancel());
        assert_eq!(track.status, TrackStatus::Cancelled);

        let mut done = JobTrack::new("session-1", AssessmentKind::Llm);
        done.observe(TrackStatus::Completed);
        assert!(!done.cancel());
        assert_eq!(done.status, TrackStatus::Completed);
    }

    #[test]
    fn reanalyze_requeues_completed_and_failed() {
        let mut track = track();
        track.observe(TrackStatus::Completed);
        assert!(track.reanalyze());
        assert_eq!(track.status, TrackStatus::Queued);

        let mut failed = track.clone();
        failed.observe(TrackStatus::Failed);
        assert!(failed.reanalyze());
        assert_eq!(failed.status, TrackStatus::Queued);

        let mut cancelled = JobTrack::new("session-1", AssessmentKind::Phq);
        cancelled.observe(TrackStatus::Processing);
        cancelled.cancel();
        assert!(!cancelled.reanalyze());
    }

    #[test]
    fn delete_resets_terminal_tracks() {
        let mut track = track();
        track.observe_task(Some("task-9".into()));
        track.observe(TrackStatus::Completed);
        assert!(track.delete());
        assert_eq!(track.status, TrackStatus::NotStarted);
        assert!(track.task_id.is_none());

        // a running job cannot be deleted out from under the server
        let mut running = JobTrack::new("session-1", AssessmentKind::Llm);
        running.observe(TrackStatus::Processing);
        assert!(!running.delete());
    }

    #[test]
    fn wire_format_round_trips() {
        let status: TrackStatus = serde_json::from_str("\"not_started\"").unwrap();
        assert_eq!(status, TrackStatus::NotStarted);
        assert_eq!(
            serde_json::to_string(&TrackStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
