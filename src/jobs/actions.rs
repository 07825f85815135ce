//! Operator actions against the remote analysis jobs.

use std::sync::Arc;

use crate::api::{ActionResponse, ApiError, AssessmentApi};
use crate::models::AssessmentKind;
use crate::log_warn;

use super::poller::{SessionJobPoller, TrackTaskIds};

const ENABLE_LOGS: bool = true;

/// What an operator action actually did. A server-side refusal
/// ("nothing is processing", "nothing to delete") is a no-op report,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Applied { message: Option<String> },
    NoOp { message: Option<String> },
}

impl ActionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied { .. })
    }

    fn from_response(response: ActionResponse) -> Self {
        if response.success {
            ActionOutcome::Applied {
                message: response.message,
            }
        } else {
            ActionOutcome::NoOp {
                message: response.message,
            }
        }
    }
}

/// Starts, cancels, reanalyzes and deletes per-track jobs, and hands
/// freshly started sessions to the poller.
#[derive(Clone)]
pub struct AnalysisController {
    api: Arc<dyn AssessmentApi>,
    poller: SessionJobPoller,
}

impl AnalysisController {
    pub fn new(api: Arc<dyn AssessmentApi>, poller: SessionJobPoller) -> Self {
        Self { api, poller }
    }

    pub fn poller(&self) -> &SessionJobPoller {
        &self.poller
    }

    /// Queue one track and make sure the session is being polled.
    pub async fn process(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionOutcome, ApiError> {
        let response = self.api.process_analysis(session_id, kind).await?;
        let outcome = ActionOutcome::from_response(response);
        if outcome.applied() {
            self.poller.start(session_id, TrackTaskIds::default());
        }
        Ok(outcome)
    }

    /// Queue both tracks, then start the session's poll loop. Returns
    /// whether a new loop was started.
    pub async fn process_session(&self, session_id: &str) -> Result<bool, ApiError> {
        for kind in AssessmentKind::both() {
            let response = self.api.process_analysis(session_id, kind).await?;
            if !response.success {
                log_warn!(
                    "process declined for session {session_id} {kind}: {:?}",
                    response.message
                );
            }
        }
        Ok(self.poller.start(session_id, TrackTaskIds::default()))
    }

    /// Advisory cancel. Locally the poll loop keeps running and stops
    /// through the same resolution path as natural completion.
    pub async fn cancel(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionOutcome, ApiError> {
        let response = self.api.cancel_analysis(session_id, kind).await?;
        Ok(ActionOutcome::from_response(response))
    }

    pub async fn reanalyze(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionOutcome, ApiError> {
        let response = self.api.reanalyze(session_id, kind).await?;
        let outcome = ActionOutcome::from_response(response);
        if outcome.applied() {
            self.poller.start(session_id, TrackTaskIds::default());
        }
        Ok(outcome)
    }

    pub async fn delete(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionOutcome, ApiError> {
        let response = self.api.delete_analysis(session_id, kind).await?;
        Ok(ActionOutcome::from_response(response))
    }
}
