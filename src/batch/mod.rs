//! Fleet-wide batch processing: enqueue every eligible session, then
//! follow the server's aggregate progress on a coarse poll loop.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, AssessmentApi, BatchStats, BatchStatusResponse};
use crate::config::debug_mode;
use crate::events::{BatchEndReason, CoreEvent, EventBus};
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub period: Duration,
    /// Larger budget than the per-session poller: a fleet run is
    /// expected to take a while.
    pub max_ticks: u32,
    /// Every Nth tick also asks the UI to re-fetch the session table so
    /// individual completions show up, not just the aggregate bar.
    pub refresh_every_ticks: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            period: if debug_mode() {
                Duration::from_secs(2)
            } else {
                Duration::from_secs(15)
            },
            max_ticks: 240,
            refresh_every_ticks: 4,
        }
    }
}

/// Last observed fleet state, kept for UI reads between events.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchSnapshot {
    pub is_running: bool,
    pub total: u32,
    pub stats: BatchStats,
    pub percent: f64,
    /// Sessions the server reported queuing, in enqueue order.
    pub session_ids: Vec<String>,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    api: Arc<dyn AssessmentApi>,
    events: EventBus,
    config: BatchConfig,
    snapshot: Arc<Mutex<BatchSnapshot>>,
    loop_token: Arc<Mutex<Option<CancellationToken>>>,
}

impl BatchOrchestrator {
    pub fn new(api: Arc<dyn AssessmentApi>, events: EventBus) -> Self {
        Self::with_config(api, events, BatchConfig::default())
    }

    pub fn with_config(api: Arc<dyn AssessmentApi>, events: EventBus, config: BatchConfig) -> Self {
        Self {
            api,
            events,
            config,
            snapshot: Arc::new(Mutex::new(BatchSnapshot::default())),
            loop_token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn snapshot(&self) -> BatchSnapshot {
        self.snapshot.lock().unwrap().clone()
    }

    /// Ask the server to queue every eligible session. Fire-and-forget
    /// from the client's perspective: sequencing happens server-side.
    /// Returns how many sessions the server queued (0 when it
    /// declined, e.g. a run is already active).
    pub async fn enqueue_all(&self) -> Result<usize, ApiError> {
        let response = self.api.start_batch().await?;
        if !response.success {
            log_info!("batch start declined: {:?}", response.message);
            return Ok(0);
        }

        let count = response.session_ids.len();
        self.snapshot.lock().unwrap().session_ids = response.session_ids;
        log_info!("batch queued {count} sessions");
        Ok(count)
    }

    /// Start the progress loop; a second call while one is active is a
    /// no-op returning false.
    pub fn track_progress(&self) -> bool {
        let mut slot = self.loop_token.lock().unwrap();
        if slot.is_some() {
            log_info!("batch progress loop already active");
            return false;
        }
        let token = CancellationToken::new();
        *slot = Some(token.clone());

        tokio::spawn(progress_loop(
            self.api.clone(),
            self.events.clone(),
            self.config.clone(),
            self.snapshot.clone(),
            self.loop_token.clone(),
            token,
        ));
        true
    }

    pub fn is_tracking(&self) -> bool {
        self.loop_token.lock().unwrap().is_some()
    }

    pub fn stop_tracking(&self) -> bool {
        if let Some(token) = self.loop_token.lock().unwrap().take() {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Advisory cancellation of the fleet run. The progress loop keeps
    /// polling and winds down when the server reports it stopped.
    pub async fn cancel(&self) -> Result<bool, ApiError> {
        let response = self.api.cancel_batch().await?;
        if !response.success {
            log_info!("batch cancel declined: {:?}", response.message);
        }
        Ok(response.success)
    }
}

fn progress_percent(status: &BatchStatusResponse) -> f64 {
    if status.total == 0 {
        return 100.0;
    }
    f64::from(status.stats.completed + status.stats.failed) / f64::from(status.total) * 100.0
}

async fn progress_loop(
    api: Arc<dyn AssessmentApi>,
    events: EventBus,
    config: BatchConfig,
    snapshot: Arc<Mutex<BatchSnapshot>>,
    slot: Arc<Mutex<Option<CancellationToken>>>,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks: u32 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                ticks += 1;
                match api.batch_status().await {
                    Ok(status) => {
                        let percent = progress_percent(&status);
                        {
                            let mut guard = snapshot.lock().unwrap();
                            guard.is_running = status.is_running;
                            guard.total = status.total;
                            guard.stats = status.stats;
                            guard.percent = percent;
                        }

                        events.emit(CoreEvent::BatchProgress {
                            percent,
                            total: status.total,
                            stats: status.stats,
                            is_running: status.is_running,
                        });
                        if ticks % config.refresh_every_ticks == 0 {
                            events.emit(CoreEvent::SessionsRefreshRequested);
                        }

                        // A run with nothing eligible reports running
                        // with total 0; that is completion, not an
                        // error.
                        let settled = status.total == 0
                            || status.stats.completed + status.stats.failed >= status.total;
                        if settled || !status.is_running {
                            let reason = if settled {
                                BatchEndReason::Completed
                            } else {
                                BatchEndReason::ServerStopped
                            };
                            log_info!(
                                "batch finished ({reason:?}): {}/{} after {ticks} ticks",
                                status.stats.completed + status.stats.failed,
                                status.total
                            );
                            events.emit(CoreEvent::BatchFinished {
                                reason,
                                percent,
                                total: status.total,
                                stats: status.stats,
                            });
                            break;
                        }
                    }
                    Err(err) => {
                        log_warn!("batch status poll failed: {err}");
                    }
                }

                if ticks >= config.max_ticks {
                    let last = snapshot.lock().unwrap().clone();
                    log_warn!(
                        "batch progress budget exhausted after {ticks} ticks at {:.0}%",
                        last.percent
                    );
                    events.emit(CoreEvent::BatchFinished {
                        reason: BatchEndReason::TimedOut,
                        percent: last.percent,
                        total: last.total,
                        stats: last.stats,
                    });
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("batch progress loop cancelled");
                break;
            }
        }
    }

    *slot.lock().unwrap() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use tokio::time::advance;

    fn orchestrator(api: Arc<FakeApi>, events: EventBus) -> BatchOrchestrator {
        BatchOrchestrator::with_config(
            api,
            events,
            BatchConfig {
                period: Duration::from_secs(15),
                max_ticks: 8,
                refresh_every_ticks: 2,
            },
        )
    }

    fn status(is_running: bool, total: u32, completed: u32, failed: u32) -> BatchStatusResponse {
        BatchStatusResponse {
            is_running,
            total,
            stats: BatchStats {
                queued: total.saturating_sub(completed + failed),
                processing: 0,
                completed,
                failed,
            },
            progress_percentage: None,
        }
    }

    async fn finish_reason(events: &EventBus) -> (BatchEndReason, f64) {
        let mut rx = events.subscribe();
        loop {
            if let CoreEvent::BatchFinished { reason, percent, .. } = rx.recv().await.unwrap() {
                return (reason, percent);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn progress_follows_completed_plus_failed() {
        let api = Arc::new(FakeApi::new());
        api.script_batch_statuses(vec![
            status(true, 5, 3, 1),
            status(true, 5, 4, 1),
            status(true, 5, 4, 1),
            status(true, 5, 4, 1),
        ]);

        let events = EventBus::default();
        let mut rx = events.subscribe();
        let orchestrator = orchestrator(api, events);
        assert!(orchestrator.track_progress());

        advance(Duration::from_secs(1)).await;
        let first = loop {
            if let CoreEvent::BatchProgress { percent, is_running, .. } = rx.recv().await.unwrap() {
                break (percent, is_running);
            }
        };
        assert_eq!(first.0, 80.0);
        assert!(first.1);

        orchestrator.stop_tracking();
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_when_every_session_settles() {
        let api = Arc::new(FakeApi::new());
        api.script_batch_statuses(vec![
            status(true, 5, 2, 1),
            status(true, 5, 3, 1),
            status(true, 5, 4, 1),
        ]);

        let events = EventBus::default();
        let orchestrator = orchestrator(api, events.clone());
        let waiter = tokio::spawn({
            let events = events.clone();
            async move { finish_reason(&events).await }
        });
        // let the waiter subscribe before any event fires
        tokio::task::yield_now().await;

        orchestrator.track_progress();
        for _ in 0..4 {
            advance(Duration::from_secs(15)).await;
        }

        let (reason, percent) = waiter.await.unwrap();
        assert_eq!(reason, BatchEndReason::Completed);
        assert_eq!(percent, 100.0);
        assert!(!orchestrator.is_tracking());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_fleet_is_immediate_completion() {
        let api = Arc::new(FakeApi::new());
        api.script_batch_statuses(vec![status(true, 0, 0, 0)]);

        let events = EventBus::default();
        let orchestrator = orchestrator(api, events.clone());
        let waiter = tokio::spawn({
            let events = events.clone();
            async move { finish_reason(&events).await }
        });
        tokio::task::yield_now().await;

        orchestrator.track_progress();
        advance(Duration::from_secs(1)).await;

        let (reason, percent) = waiter.await.unwrap();
        assert_eq!(reason, BatchEndReason::Completed);
        assert_eq!(percent, 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_reports_timeout() {
        let api = Arc::new(FakeApi::new());
        api.script_batch_statuses(vec![status(true, 5, 1, 0)]);

        let events = EventBus::default();
        let orchestrator = orchestrator(api, events.clone());
        let waiter = tokio::spawn({
            let events = events.clone();
            async move { finish_reason(&events).await }
        });
        tokio::task::yield_now().await;

        orchestrator.track_progress();
        for _ in 0..9 {
            advance(Duration::from_secs(15)).await;
        }

        let (reason, _) = waiter.await.unwrap();
        assert_eq!(reason, BatchEndReason::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn second_progress_loop_is_a_no_op() {
        let api = Arc::new(FakeApi::new());
        api.script_batch_statuses(vec![status(true, 5, 0, 0)]);

        let orchestrator = orchestrator(api, EventBus::default());
        assert!(orchestrator.track_progress());
        assert!(!orchestrator.track_progress());
        orchestrator.stop_tracking();
    }

    #[tokio::test]
    async fn enqueue_all_records_session_order() {
        let api = Arc::new(FakeApi::new());
        api.set_batch_sessions(vec!["s3".into(), "s1".into(), "s2".into()]);

        let orchestrator = orchestrator(api, EventBus::default());
        let count = orchestrator.enqueue_all().await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(orchestrator.snapshot().session_ids, vec!["s3", "s1", "s2"]);
    }
}
