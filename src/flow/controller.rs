//! Drives a PHQ questionnaire or LLM chat assessment from start to
//! submission, firing capture triggers as the user advances.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::api::AssessmentApi;
use crate::capture::{CaptureBuffer, TriggerKind};
use crate::events::{CoreEvent, EventBus};
use crate::models::AssessmentKind;
use crate::{log_info, log_warn};

use super::state::FlowState;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStep {
    /// Cursor moved to the next item.
    Advanced { cursor: usize, total: usize },
    /// Every item is answered; `submit_all` is the only move left.
    ReadyToSubmit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowCompletion {
    Submitted { answers: usize },
    /// Re-entrant completion (user action racing the automatic
    /// end-of-conversation detection) resolves to a no-op.
    AlreadySubmitted,
}

/// UI-facing view of the flow, readable without holding the state lock
/// across renders.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    pub assessment_id: String,
    pub cursor: usize,
    pub total: usize,
    pub answered: usize,
    pub submitted: bool,
}

pub struct SessionFlowController {
    session_id: String,
    kind: AssessmentKind,
    api: Arc<dyn AssessmentApi>,
    capture: Arc<Mutex<CaptureBuffer>>,
    state: Mutex<FlowState>,
    events: EventBus,
}

impl SessionFlowController {
    /// Obtain the assessment id and resume state from the server and
    /// point the capture buffer at the resumed item. The buffer is
    /// created and initialized by the caller: a camera-less buffer is
    /// fine, every capture through it is a no-op.
    pub async fn start(
        api: Arc<dyn AssessmentApi>,
        capture: Arc<Mutex<CaptureBuffer>>,
        events: EventBus,
        session_id: impl Into<String>,
        kind: AssessmentKind,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let bootstrap = api
            .start_assessment(&session_id, kind)
            .await
            .context("assessment bootstrap failed")?;
        let state = FlowState::from_bootstrap(bootstrap);

        log_info!(
            "assessment {} started for session {session_id} ({kind}, resume at {}/{})",
            state.assessment_id,
            state.cursor,
            state.total()
        );

        {
            let capture = capture.lock().await;
            capture.set_current_response_id(state.current().map(|item| item.id.clone()));
        }

        Ok(Self {
            session_id,
            kind,
            api,
            capture,
            state: Mutex::new(state),
            events,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn snapshot(&self) -> FlowSnapshot {
        let state = self.state.lock().await;
        FlowSnapshot {
            assessment_id: state.assessment_id.clone(),
            cursor: state.cursor,
            total: state.total(),
            answered: state.answered(),
            submitted: state.submitted,
        }
    }

    /// Answer the current item and advance. Saves are fire-and-forget
    /// mid-flow, but the final answer must be durable before the flow
    /// can move past it, so that one is awaited and a failure leaves
    /// the cursor in place for a retry.
    pub async fn answer_current(&self, value: impl Into<String>) -> Result<FlowStep> {
        let value = value.into();
        let (item_id, at_last, assessment_id) = {
            let mut state = self.state.lock().await;
            if state.submitted {
                bail!("assessment {} already submitted", state.assessment_id);
            }
            let Some(item) = state.current() else {
                bail!("no remaining items to answer");
            };
            let item_id = item.id.clone();
            state.record_answer(item_id.clone(), value.clone());
            (item_id, state.at_last_item(), state.assessment_id.clone())
        };

        if at_last {
            self.api
                .save_answer(&assessment_id, &item_id, &value)
                .await
                .context("final answer save failed")?;
        } else {
            let api = self.api.clone();
            let assessment_id = assessment_id.clone();
            let item_id = item_id.clone();
            tokio::spawn(async move {
                if let Err(err) = api.save_answer(&assessment_id, &item_id, &value).await {
                    log_warn!("answer save failed for {assessment_id}/{item_id}: {err}");
                }
            });
        }

        let (cursor, total, next_id) = {
            let mut state = self.state.lock().await;
            state.advance();
            (
                state.cursor,
                state.total(),
                state.current().map(|item| item.id.clone()),
            )
        };

        {
            let capture = self.capture.lock().await;
            capture.set_current_response_id(next_id.clone());
            if next_id.is_some() {
                let trigger = match self.kind {
                    AssessmentKind::Phq => TriggerKind::QuestionStart,
                    AssessmentKind::Llm => TriggerKind::MessageSend,
                };
                if let Err(err) = capture.capture(trigger).await {
                    log_warn!(
                        "capture after advance failed for session {}: {err:?}",
                        self.session_id
                    );
                }
            }
        }

        self.events.emit(CoreEvent::FlowAdvanced {
            assessment_id,
            cursor,
            total,
        });

        Ok(if next_id.is_some() {
            FlowStep::Advanced { cursor, total }
        } else {
            FlowStep::ReadyToSubmit
        })
    }

    /// Capture hook for ad-hoc interactions (navigation buttons and
    /// the like); failures only log.
    pub async fn on_button_click(&self) {
        let capture = self.capture.lock().await;
        if let Err(err) = capture.capture(TriggerKind::ButtonClick).await {
            log_warn!(
                "button-click capture failed for session {}: {err:?}",
                self.session_id
            );
        }
    }

    /// Terminal transition: link the queued captures to this
    /// assessment, submit the accumulated answers, then tear the
    /// capture buffer down. Guarded against re-entry; a failed submit
    /// releases the guard so the user can retry.
    pub async fn submit_all(&self) -> Result<FlowCompletion> {
        {
            let mut state = self.state.lock().await;
            if state.submitted {
                return Ok(FlowCompletion::AlreadySubmitted);
            }
            state.submitted = true;
        }

        let (assessment_id, answers) = {
            let state = self.state.lock().await;
            (state.assessment_id.clone(), state.answers.clone())
        };

        // Link before submit so the server can associate captures with
        // the finished record; a failure is recoverable at teardown.
        {
            let capture = self.capture.lock().await;
            if let Err(err) = capture.link_queued_captures(Some(&assessment_id)).await {
                log_warn!(
                    "capture link failed at submit for {assessment_id}; \
                     records stay queued for teardown: {err:?}"
                );
            }
        }

        let submit = self.api.submit_assessment(&assessment_id, &answers).await;
        match submit {
            Ok(response) if response.success => {}
            Ok(response) => {
                self.state.lock().await.submitted = false;
                bail!(
                    "server declined submission of {assessment_id}: {:?}",
                    response.message
                );
            }
            Err(err) => {
                self.state.lock().await.submitted = false;
                return Err(anyhow::Error::new(err).context("assessment submission failed"));
            }
        }

        self.capture.lock().await.cleanup().await?;

        log_info!(
            "assessment {assessment_id} submitted with {} answers",
            answers.len()
        );
        self.events.emit(CoreEvent::AssessmentSubmitted {
            assessment_id,
            answers: answers.len(),
        });

        Ok(FlowCompletion::Submitted {
            answers: answers.len(),
        })
    }
}
