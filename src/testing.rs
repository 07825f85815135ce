//! In-memory fakes shared by the unit tests: a scriptable server API
//! and a canned frame source.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{
    ActionResponse, ApiError, AssessmentApi, BatchStartResponse, BatchStatusResponse,
    FlowBootstrap, JobStatusResponse, LinkRequest, LinkResponse, UploadResponse,
};
use crate::capture::{CameraError, FrameSource, RawFrame, TriggerKind};
use crate::config::Resolution;
use crate::jobs::TrackStatus;
use crate::models::AssessmentKind;

pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone)]
pub struct UploadCall {
    pub session_id: String,
    pub kind: AssessmentKind,
    pub trigger: TriggerKind,
    pub bytes: usize,
}

/// Scriptable [`AssessmentApi`]. Status scripts pop per call, with the
/// last entry repeating forever; `Err(())` entries become transient
/// protocol errors. Unscripted status endpoints also error, which the
/// loops under test must tolerate.
#[derive(Default)]
pub struct FakeApi {
    uploads: Mutex<Vec<UploadCall>>,
    upload_failures: AtomicU32,
    upload_seq: AtomicU32,
    links: Mutex<Vec<LinkRequest>>,
    link_failures: AtomicU32,
    job_scripts: Mutex<HashMap<(String, AssessmentKind), VecDeque<Result<TrackStatus, ()>>>>,
    batch_scripts: Mutex<VecDeque<BatchStatusResponse>>,
    batch_sessions: Mutex<Vec<String>>,
    decline_message: Mutex<Option<String>>,
    process_count: AtomicU32,
    saves: Mutex<Vec<(String, String, String)>>,
    save_failures: AtomicU32,
    submits: Mutex<Vec<(String, usize)>>,
    submit_failures: AtomicU32,
    bootstrap: Mutex<Option<FlowBootstrap>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_job_statuses(
        &self,
        session_id: &str,
        kind: AssessmentKind,
        statuses: Vec<Result<TrackStatus, ()>>,
    ) {
        self.job_scripts
            .lock()
            .unwrap()
            .entry((session_id.to_string(), kind))
            .or_default()
            .extend(statuses);
    }

    pub fn script_batch_statuses(&self, statuses: Vec<BatchStatusResponse>) {
        self.batch_scripts.lock().unwrap().extend(statuses);
    }

    pub fn set_batch_sessions(&self, session_ids: Vec<String>) {
        *self.batch_sessions.lock().unwrap() = session_ids;
    }

    /// Make every operator action answer `success: false`.
    pub fn decline_actions(&self, message: &str) {
        *self.decline_message.lock().unwrap() = Some(message.to_string());
    }

    pub fn set_bootstrap(&self, bootstrap: FlowBootstrap) {
        *self.bootstrap.lock().unwrap() = Some(bootstrap);
    }

    pub fn fail_next_uploads(&self, count: u32) {
        self.upload_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_links(&self, count: u32) {
        self.link_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_saves(&self, count: u32) {
        self.save_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_submits(&self, count: u32) {
        self.submit_failures.store(count, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub fn upload_calls(&self) -> Vec<UploadCall> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn link_requests(&self) -> Vec<LinkRequest> {
        self.links.lock().unwrap().clone()
    }

    pub fn process_calls(&self) -> u32 {
        self.process_count.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> Vec<(String, String, String)> {
        self.saves.lock().unwrap().clone()
    }

    pub fn submit_calls(&self) -> Vec<(String, usize)> {
        self.submits.lock().unwrap().clone()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    fn next_scripted<T: Clone>(queue: &mut VecDeque<T>) -> Option<T> {
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }

    fn action_response(&self) -> ActionResponse {
        match self.decline_message.lock().unwrap().clone() {
            Some(message) => ActionResponse {
                success: false,
                message: Some(message),
            },
            None => ActionResponse {
                success: true,
                message: None,
            },
        }
    }
}

#[async_trait]
impl AssessmentApi for FakeApi {
    async fn upload_capture(
        &self,
        session_id: &str,
        kind: AssessmentKind,
        trigger: TriggerKind,
        jpeg: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        if Self::take_failure(&self.upload_failures) {
            return Err(ApiError::Protocol("scripted upload failure".into()));
        }

        let seq = self.upload_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploads.lock().unwrap().push(UploadCall {
            session_id: session_id.to_string(),
            kind,
            trigger,
            bytes: jpeg.len(),
        });

        Ok(UploadResponse {
            capture_id: format!("cap-{seq}"),
            filename: format!("capture_{session_id}_{seq}.jpg"),
            timestamp: Utc::now(),
            trigger: trigger.as_str().to_string(),
        })
    }

    async fn link_captures(&self, request: &LinkRequest) -> Result<LinkResponse, ApiError> {
        if Self::take_failure(&self.link_failures) {
            return Err(ApiError::Protocol("scripted link failure".into()));
        }
        self.links.lock().unwrap().push(request.clone());
        Ok(LinkResponse { success: true })
    }

    async fn job_status(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<JobStatusResponse, ApiError> {
        let mut scripts = self.job_scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&(session_id.to_string(), kind))
            .ok_or_else(|| ApiError::Protocol("no status script".into()))?;
        match Self::next_scripted(queue) {
            Some(Ok(status)) => Ok(JobStatusResponse {
                status,
                task_id: None,
                message: None,
            }),
            Some(Err(())) => Err(ApiError::Protocol("scripted status failure".into())),
            None => Err(ApiError::Protocol("status script exhausted".into())),
        }
    }

    async fn process_analysis(
        &self,
        _session_id: &str,
        _kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        self.process_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.action_response())
    }

    async fn cancel_analysis(
        &self,
        _session_id: &str,
        _kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        Ok(self.action_response())
    }

    async fn reanalyze(
        &self,
        _session_id: &str,
        _kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        Ok(self.action_response())
    }

    async fn delete_analysis(
        &self,
        _session_id: &str,
        _kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        Ok(self.action_response())
    }

    async fn start_batch(&self) -> Result<BatchStartResponse, ApiError> {
        let declined = self.decline_message.lock().unwrap().clone();
        Ok(BatchStartResponse {
            success: declined.is_none(),
            message: declined,
            session_ids: self.batch_sessions.lock().unwrap().clone(),
        })
    }

    async fn cancel_batch(&self) -> Result<ActionResponse, ApiError> {
        Ok(self.action_response())
    }

    async fn batch_status(&self) -> Result<BatchStatusResponse, ApiError> {
        let mut queue = self.batch_scripts.lock().unwrap();
        match Self::next_scripted(&mut queue) {
            Some(status) => Ok(status),
            None => Err(ApiError::Protocol("no batch script".into())),
        }
    }

    async fn start_assessment(
        &self,
        _session_id: &str,
        _kind: AssessmentKind,
    ) -> Result<FlowBootstrap, ApiError> {
        self.bootstrap
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::Protocol("no bootstrap configured".into()))
    }

    async fn save_answer(
        &self,
        assessment_id: &str,
        item_id: &str,
        value: &str,
    ) -> Result<ActionResponse, ApiError> {
        if Self::take_failure(&self.save_failures) {
            return Err(ApiError::Protocol("scripted save failure".into()));
        }
        self.saves.lock().unwrap().push((
            assessment_id.to_string(),
            item_id.to_string(),
            value.to_string(),
        ));
        Ok(ActionResponse {
            success: true,
            message: None,
        })
    }

    async fn submit_assessment(
        &self,
        assessment_id: &str,
        answers: &HashMap<String, String>,
    ) -> Result<ActionResponse, ApiError> {
        if Self::take_failure(&self.submit_failures) {
            return Err(ApiError::Protocol("scripted submit failure".into()));
        }
        self.submits
            .lock()
            .unwrap()
            .push((assessment_id.to_string(), answers.len()));
        Ok(ActionResponse {
            success: true,
            message: None,
        })
    }
}

/// Canned camera. The shared flags survive the move into a
/// [`CaptureBuffer`] so tests can observe open/release.
pub struct FakeFrameSource {
    pub fail_open: bool,
    pub fail_grab: bool,
    pub opened: Arc<AtomicBool>,
    pub released: Arc<AtomicBool>,
    pub grabs: Arc<AtomicU32>,
}

impl FakeFrameSource {
    pub fn new() -> Self {
        Self {
            fail_open: false,
            fail_grab: false,
            opened: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
            grabs: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }
}

impl FrameSource for FakeFrameSource {
    fn open(&mut self, _resolution: Resolution) -> Result<(), CameraError> {
        if self.fail_open {
            return Err(CameraError::Unavailable("permission denied".into()));
        }
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn grab(&mut self) -> Result<RawFrame, CameraError> {
        if self.fail_grab {
            return Err(CameraError::Frame("device wedged".into()));
        }
        self.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(RawFrame {
            width: 16,
            height: 12,
            rgb: vec![200; 16 * 12 * 3],
        })
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.opened.store(false, Ordering::SeqCst);
    }
}
