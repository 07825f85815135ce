//! Webcam capture buffer: schedules captures, uploads each frame the
//! moment it is taken, and keeps only metadata locally until the queue
//! is linked to a finished assessment.
//!
//! Upload policy is at-most-one-attempt per capture: a frame whose
//! upload failed is gone, recovery happens only at the link stage. The
//! local queue therefore records completion order, not capture order.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::{AssessmentApi, LinkRequest};
use crate::config::{CaptureConfig, CaptureMode};
use crate::events::{CoreEvent, EventBus};
use crate::models::AssessmentKind;
use crate::{log_error, log_info, log_warn};

use super::frame::{encode_jpeg, CameraError, FrameSource};
use super::policy::{should_capture, TriggerKind};

const ENABLE_LOGS: bool = true;

// Bounds a full grab/encode/upload cycle in the interval loop; must
// exceed the HTTP request timeout.
const CAPTURE_TIMEOUT_SECS: u64 = 35;

/// Metadata for one durably uploaded capture. The binary payload is
/// discarded once the upload succeeds; only this record stays queued
/// until the link step.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRecord {
    /// Client-side identity, assigned before the server id exists.
    pub local_id: Uuid,
    pub capture_id: String,
    pub session_id: String,
    pub kind: AssessmentKind,
    pub trigger: TriggerKind,
    pub captured_at: DateTime<Utc>,
    pub byte_size: usize,
    pub response_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub captured: u64,
    pub uploaded: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Policy said no, or the buffer has no camera / is torn down.
    Skipped,
    Captured {
        capture_id: String,
    },
}

/// Guards the camera device against two buffers instrumenting the same
/// session. Created by whoever assembles the client and injected into
/// every buffer.
#[derive(Clone, Default)]
pub struct CaptureRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, session_id: &str) -> bool {
        self.active.lock().unwrap().insert(session_id.to_string())
    }

    fn release(&self, session_id: &str) {
        self.active.lock().unwrap().remove(session_id);
    }

    pub fn is_active(&self, session_id: &str) -> bool {
        self.active.lock().unwrap().contains(session_id)
    }
}

struct BufferInner {
    session_id: String,
    kind: AssessmentKind,
    config: CaptureConfig,
    api: Arc<dyn AssessmentApi>,
    registry: CaptureRegistry,
    events: EventBus,
    source: tokio::sync::Mutex<Box<dyn FrameSource>>,
    queue: Mutex<Vec<CaptureRecord>>,
    current_response: Mutex<Option<String>>,
    /// Camera handle held.
    active: AtomicBool,
    /// Torn down; every later operation is a no-op.
    closed: AtomicBool,
    captured: AtomicU64,
    uploaded: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl BufferInner {
    async fn capture_once(&self, trigger: TriggerKind) -> Result<CaptureOutcome> {
        if self.closed.load(Ordering::SeqCst) || !self.active.load(Ordering::SeqCst) {
            return Ok(CaptureOutcome::Skipped);
        }

        if !should_capture(trigger, &self.config) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(CaptureOutcome::Skipped);
        }

        let local_id = Uuid::new_v4();
        let captured_at = Utc::now();
        self.captured.fetch_add(1, Ordering::Relaxed);

        let frame = {
            let mut source = self.source.lock().await;
            source.grab()
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.emit_failure(trigger, &err.to_string());
                return Err(anyhow::Error::new(err).context("frame grab failed"));
            }
        };

        let jpeg = match encode_jpeg(frame, self.config.jpeg_quality).await {
            Ok(jpeg) => jpeg,
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.emit_failure(trigger, &format!("{err:?}"));
                return Err(err);
            }
        };
        let byte_size = jpeg.len();

        // teardown may have started while the frame was encoding
        if self.closed.load(Ordering::SeqCst) {
            return Ok(CaptureOutcome::Skipped);
        }

        match self
            .api
            .upload_capture(&self.session_id, self.kind, trigger, jpeg)
            .await
        {
            Ok(response) => {
                self.uploaded.fetch_add(1, Ordering::Relaxed);
                let record = CaptureRecord {
                    local_id,
                    capture_id: response.capture_id.clone(),
                    session_id: self.session_id.clone(),
                    kind: self.kind,
                    trigger,
                    captured_at,
                    byte_size,
                    response_id: self.current_response.lock().unwrap().clone(),
                };
                self.queue.lock().unwrap().push(record);

                log_info!(
                    "capture {} uploaded as {} ({} bytes, trigger={}) session {}",
                    local_id,
                    response.capture_id,
                    byte_size,
                    trigger,
                    self.session_id
                );
                self.events.emit(CoreEvent::CaptureUploaded {
                    session_id: self.session_id.clone(),
                    capture_id: response.capture_id.clone(),
                    trigger,
                    byte_size,
                });

                Ok(CaptureOutcome::Captured {
                    capture_id: response.capture_id,
                })
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.emit_failure(trigger, &err.to_string());
                Err(anyhow::Error::new(err).context("capture upload failed"))
            }
        }
    }

    fn emit_failure(&self, trigger: TriggerKind, message: &str) {
        self.events.emit(CoreEvent::CaptureFailed {
            session_id: self.session_id.clone(),
            trigger,
            message: message.to_string(),
        });
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            captured: self.captured.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

async fn interval_loop(inner: Arc<BufferInner>, cancel_token: CancellationToken) {
    let period = Duration::from_secs(inner.config.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fut = inner.capture_once(TriggerKind::Interval);
                match tokio::time::timeout(Duration::from_secs(CAPTURE_TIMEOUT_SECS), fut).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => log_error!(
                        "interval capture failed for session {}: {err:?}",
                        inner.session_id
                    ),
                    Err(_) => log_warn!(
                        "interval capture timeout (> {}s) session {}",
                        CAPTURE_TIMEOUT_SECS,
                        inner.session_id
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("capture loop shutting down for session {}", inner.session_id);
                break;
            }
        }
    }
}

/// Owns the camera for one session and the local queue of uploaded but
/// not-yet-linked capture records.
pub struct CaptureBuffer {
    inner: Arc<BufferInner>,
    ticker_token: Option<CancellationToken>,
}

impl CaptureBuffer {
    pub fn new(
        session_id: impl Into<String>,
        kind: AssessmentKind,
        config: CaptureConfig,
        api: Arc<dyn AssessmentApi>,
        source: Box<dyn FrameSource>,
        registry: CaptureRegistry,
        events: EventBus,
    ) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                session_id: session_id.into(),
                kind,
                config,
                api,
                registry,
                events,
                source: tokio::sync::Mutex::new(source),
                queue: Mutex::new(Vec::new()),
                current_response: Mutex::new(None),
                active: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                captured: AtomicU64::new(0),
                uploaded: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
            }),
            ticker_token: None,
        }
    }

    /// Acquire the camera and, in interval mode, start the recurring
    /// timer. A `CameraUnavailable` result is non-fatal for the
    /// assessment: the buffer stays usable and every capture becomes a
    /// no-op.
    pub async fn initialize(&mut self) -> Result<(), CameraError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(CameraError::Unavailable("buffer already torn down".into()));
        }
        if self.inner.active.load(Ordering::SeqCst) {
            return Err(CameraError::AlreadyActive(self.inner.session_id.clone()));
        }
        if !self.inner.registry.acquire(&self.inner.session_id) {
            return Err(CameraError::AlreadyActive(self.inner.session_id.clone()));
        }

        let resolution = self.inner.config.resolution_or_default();
        {
            let mut source = self.inner.source.lock().await;
            if let Err(err) = source.open(resolution) {
                self.inner.registry.release(&self.inner.session_id);
                return Err(err);
            }
        }
        self.inner.active.store(true, Ordering::SeqCst);

        if self.inner.config.mode == Some(CaptureMode::Interval) {
            let token = CancellationToken::new();
            tokio::spawn(interval_loop(self.inner.clone(), token.clone()));
            self.ticker_token = Some(token);
        }

        log_info!(
            "capture buffer initialized for session {} ({}, mode {:?})",
            self.inner.session_id,
            self.inner.kind,
            self.inner.config.mode
        );
        Ok(())
    }

    /// Capture on a trigger event. Skips are silent successes; an
    /// upload failure is surfaced but never affects the next trigger.
    pub async fn capture(&self, trigger: TriggerKind) -> Result<CaptureOutcome> {
        self.inner.capture_once(trigger).await
    }

    /// Associate subsequently queued captures with a logical
    /// response/turn. Already-queued records keep their association.
    pub fn set_current_response_id(&self, response_id: Option<String>) {
        *self.inner.current_response.lock().unwrap() = response_id;
    }

    pub fn queued(&self) -> Vec<CaptureRecord> {
        self.inner.queue.lock().unwrap().clone()
    }

    pub fn queued_len(&self) -> usize {
        self.inner.queue.lock().unwrap().len()
    }

    pub fn stats(&self) -> CaptureStats {
        self.inner.stats()
    }

    /// Send every queued capture id (with its response association) to
    /// the server in one request. Success clears exactly the records
    /// that were sent; failure leaves the queue intact so the call can
    /// be retried without re-uploading anything. Passing no assessment
    /// id orphan-saves the queue (teardown path).
    pub async fn link_queued_captures(&self, assessment_id: Option<&str>) -> Result<usize> {
        let records = self.inner.queue.lock().unwrap().clone();
        if records.is_empty() {
            return Ok(0);
        }

        let response_ids: Vec<Option<String>> =
            records.iter().map(|r| r.response_id.clone()).collect();
        let mut request = LinkRequest {
            assessment_id: assessment_id.map(str::to_string),
            capture_ids: records.iter().map(|r| r.capture_id.clone()).collect(),
            phq_response_ids: None,
            llm_conversation_ids: None,
        };
        match self.inner.kind {
            AssessmentKind::Phq => request.phq_response_ids = Some(response_ids),
            AssessmentKind::Llm => request.llm_conversation_ids = Some(response_ids),
        }

        let response = self
            .inner
            .api
            .link_captures(&request)
            .await
            .context("link request failed")?;
        if !response.success {
            bail!(
                "server declined capture link for session {}",
                self.inner.session_id
            );
        }

        // Only drop what was sent; captures queued mid-flight stay.
        let sent: HashSet<Uuid> = records.iter().map(|r| r.local_id).collect();
        self.inner
            .queue
            .lock()
            .unwrap()
            .retain(|record| !sent.contains(&record.local_id));

        log_info!(
            "linked {} captures for session {} (assessment {:?})",
            records.len(),
            self.inner.session_id,
            assessment_id
        );
        Ok(records.len())
    }

    /// Tear the buffer down: best-effort flush of unlinked records
    /// (orphan-save rather than lose), stop the interval timer, release
    /// the camera. Safe to call any number of times; this is the only
    /// place the camera handle is permanently released.
    pub async fn cleanup(&mut self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(token) = self.ticker_token.take() {
            token.cancel();
        }

        let pending = self.inner.queue.lock().unwrap().len();
        if pending > 0 {
            if let Err(err) = self.link_queued_captures(None).await {
                log_warn!(
                    "teardown link failed for session {} ({} records dropped): {err:?}",
                    self.inner.session_id,
                    pending
                );
            }
        }
        let orphaned = self.inner.queue.lock().unwrap().len();
        self.inner.queue.lock().unwrap().clear();

        {
            let mut source = self.inner.source.lock().await;
            source.release();
        }
        if self.inner.active.swap(false, Ordering::SeqCst) {
            self.inner.registry.release(&self.inner.session_id);
        }

        self.inner.events.emit(CoreEvent::CaptureTeardown {
            session_id: self.inner.session_id.clone(),
            stats: self.inner.stats(),
            orphaned,
        });
        log_info!(
            "capture buffer torn down for session {} ({:?})",
            self.inner.session_id,
            self.inner.stats()
        );
        Ok(())
    }
}
