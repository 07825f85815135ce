//! Derived session-level analysis status.
//!
//! Never stored: always recomputed from the two track statuses.

use serde::{Deserialize, Serialize};

use super::track::TrackStatus;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionAnalysisStatus {
    NotStarted,
    Processing,
    Completed,
    /// Both tracks terminal, exactly one of them completed.
    Partial,
    /// Both tracks terminal, neither completed (cancelled folds into
    /// failed at this level; the per-track status keeps the
    /// distinction).
    Failed,
}

impl SessionAnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionAnalysisStatus::NotStarted => "not_started",
            SessionAnalysisStatus::Processing => "processing",
            SessionAnalysisStatus::Completed => "completed",
            SessionAnalysisStatus::Partial => "partial",
            SessionAnalysisStatus::Failed => "failed",
        }
    }

    /// True once both tracks have nothing further to report.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            SessionAnalysisStatus::Completed
                | SessionAnalysisStatus::Partial
                | SessionAnalysisStatus::Failed
        )
    }
}

impl std::fmt::Display for SessionAnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold both track statuses into the session status. Precedence:
/// both fresh, anything processing, both completed, both terminal,
/// otherwise still in flight.
pub fn combine(phq: TrackStatus, llm: TrackStatus) -> SessionAnalysisStatus {
    if phq == TrackStatus::NotStarted && llm == TrackStatus::NotStarted {
        return SessionAnalysisStatus::NotStarted;
    }
    if phq == TrackStatus::Processing || llm == TrackStatus::Processing {
        return SessionAnalysisStatus::Processing;
    }
    if phq == TrackStatus::Completed && llm == TrackStatus::Completed {
        return SessionAnalysisStatus::Completed;
    }
    if phq.is_terminal() && llm.is_terminal() {
        if phq == TrackStatus::Completed || llm == TrackStatus::Completed {
            return SessionAnalysisStatus::Partial;
        }
        return SessionAnalysisStatus::Failed;
    }
    SessionAnalysisStatus::Processing
}
