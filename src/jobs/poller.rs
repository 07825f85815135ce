//! Per-session polling of both analysis tracks.
//!
//! One loop per session, ever: the registry is the check-and-set that
//! makes a second `start` a no-op instead of a duplicate timer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::AssessmentApi;
use crate::config::debug_mode;
use crate::events::{CoreEvent, EventBus};
use crate::models::AssessmentKind;
use crate::{log_debug, log_info, log_warn};

use super::combined::{combine, SessionAnalysisStatus};
use super::track::JobTrack;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub period: Duration,
    /// Local polling budget; the loop stops after this many ticks even
    /// if the remote service never terminates the job.
    pub max_ticks: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            period: if debug_mode() {
                Duration::from_secs(1)
            } else {
                Duration::from_secs(5)
            },
            max_ticks: 60,
        }
    }
}

/// Remote task identifiers handed over by whoever started the jobs.
/// Absent ids are picked up from status responses.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackTaskIds {
    pub phq: Option<String>,
    pub llm: Option<String>,
}

/// Session-keyed registry of live poll loops. Cloneable handle; the
/// owner injects it wherever loops are started.
#[derive(Clone, Default)]
pub struct PollerRegistry {
    inner: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl PollerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-set: registers and returns a token only if the session
    /// has no active loop.
    fn try_register(&self, session_id: &str) -> Option<CancellationToken> {
        let mut guard = self.inner.lock().unwrap();
        if guard.contains_key(session_id) {
            return None;
        }
        let token = CancellationToken::new();
        guard.insert(session_id.to_string(), token.clone());
        Some(token)
    }

    fn deregister(&self, session_id: &str) {
        self.inner.lock().unwrap().remove(session_id);
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.inner.lock().unwrap().contains_key(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Cancel a session's loop if one is running.
    pub fn stop(&self, session_id: &str) -> bool {
        if let Some(token) = self.inner.lock().unwrap().remove(session_id) {
            token.cancel();
            true
        } else {
            false
        }
    }
}

#[derive(Clone)]
pub struct SessionJobPoller {
    api: Arc<dyn AssessmentApi>,
    registry: PollerRegistry,
    events: EventBus,
    config: PollerConfig,
}

impl SessionJobPoller {
    pub fn new(api: Arc<dyn AssessmentApi>, registry: PollerRegistry, events: EventBus) -> Self {
        Self::with_config(api, registry, events, PollerConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn AssessmentApi>,
        registry: PollerRegistry,
        events: EventBus,
        config: PollerConfig,
    ) -> Self {
        Self {
            api,
            registry,
            events,
            config,
        }
    }

    pub fn registry(&self) -> &PollerRegistry {
        &self.registry
    }

    /// Start polling a session. Returns false (and does nothing) when a
    /// loop for that session is already active.
    pub fn start(&self, session_id: &str, task_ids: TrackTaskIds) -> bool {
        let Some(token) = self.registry.try_register(session_id) else {
            log_info!("poll loop already active for session {session_id}");
            return false;
        };

        tokio::spawn(poll_loop(
            self.api.clone(),
            self.registry.clone(),
            self.events.clone(),
            self.config.clone(),
            session_id.to_string(),
            task_ids,
            token,
        ));
        true
    }

    pub fn stop(&self, session_id: &str) -> bool {
        self.registry.stop(session_id)
    }
}

async fn poll_loop(
    api: Arc<dyn AssessmentApi>,
    registry: PollerRegistry,
    events: EventBus,
    config: PollerConfig,
    session_id: String,
    task_ids: TrackTaskIds,
    cancel_token: CancellationToken,
) {
    let mut phq = JobTrack::new(session_id.clone(), AssessmentKind::Phq).with_task(task_ids.phq);
    let mut llm = JobTrack::new(session_id.clone(), AssessmentKind::Llm).with_task(task_ids.llm);
    let mut last_combined: Option<SessionAnalysisStatus> = None;

    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                poll_track(&api, &mut phq).await;
                poll_track(&api, &mut llm).await;

                let combined = combine(phq.status, llm.status);
                if last_combined != Some(combined) {
                    last_combined = Some(combined);
                    events.emit(CoreEvent::AnalysisStatusChanged {
                        session_id: session_id.clone(),
                        combined,
                        phq: phq.status,
                        llm: llm.status,
                    });
                }

                if combined.is_resolved() {
                    log_info!(
                        "analysis resolved for session {session_id}: {combined} (phq={}, llm={})",
                        phq.status,
                        llm.status
                    );
                    events.emit(CoreEvent::AnalysisResolved {
                        session_id: session_id.clone(),
                        combined,
                        phq: phq.status,
                        llm: llm.status,
                    });
                    break;
                }

                if ticks >= config.max_ticks {
                    log_warn!(
                        "poll budget exhausted for session {session_id} after {ticks} ticks \
                         (phq={}, llm={})",
                        phq.status,
                        llm.status
                    );
                    events.emit(CoreEvent::AnalysisTimedOut {
                        session_id: session_id.clone(),
                        phq: phq.status,
                        llm: llm.status,
                    });
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("poll loop cancelled for session {session_id}");
                break;
            }
        }
    }

    registry.deregister(&session_id);
}

/// One status request for one track. A failed tick leaves the track
/// untouched; the next period retries.
async fn poll_track(api: &Arc<dyn AssessmentApi>, track: &mut JobTrack) {
    track.poll_count += 1;
    match api.job_status(&track.session_id, track.kind).await {
        Ok(response) => {
            track.observe_task(response.task_id);
            if track.observe(response.status) {
                log_debug!(
                    "session {} {} moved to {} (poll #{})",
                    track.session_id,
                    track.kind,
                    track.status,
                    track.poll_count
                );
            }
        }
        Err(err) => {
            log_warn!(
                "status poll failed for session {} {}: {err}",
                track.session_id,
                track.kind
            );
        }
    }
}
