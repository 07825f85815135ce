//! HTTP boundary: the server API trait, wire types, envelope decoding
//! and the reqwest-backed implementation.

pub mod envelope;
pub mod error;
pub mod http;
pub mod types;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::capture::TriggerKind;
use crate::models::AssessmentKind;

pub use error::ApiError;
pub use http::HttpApi;
pub use types::{
    ActionResponse, BatchStartResponse, BatchStats, BatchStatusResponse, FlowBootstrap,
    JobStatusResponse, LinkRequest, LinkResponse, UploadResponse,
};

/// Everything the core asks of the platform server. Kept behind a trait
/// so tests drive the controllers against an in-memory fake.
#[async_trait]
pub trait AssessmentApi: Send + Sync {
    /// Upload one encoded frame as an independent unit of work.
    async fn upload_capture(
        &self,
        session_id: &str,
        kind: AssessmentKind,
        trigger: TriggerKind,
        jpeg: Vec<u8>,
    ) -> Result<UploadResponse, ApiError>;

    async fn link_captures(&self, request: &LinkRequest) -> Result<LinkResponse, ApiError>;

    async fn job_status(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<JobStatusResponse, ApiError>;

    async fn process_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError>;

    async fn cancel_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError>;

    async fn reanalyze(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError>;

    async fn delete_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError>;

    async fn start_batch(&self) -> Result<BatchStartResponse, ApiError>;

    async fn cancel_batch(&self) -> Result<ActionResponse, ApiError>;

    async fn batch_status(&self) -> Result<BatchStatusResponse, ApiError>;

    async fn start_assessment(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<FlowBootstrap, ApiError>;

    async fn save_answer(
        &self,
        assessment_id: &str,
        item_id: &str,
        value: &str,
    ) -> Result<ActionResponse, ApiError>;

    async fn submit_assessment(
        &self,
        assessment_id: &str,
        answers: &HashMap<String, String>,
    ) -> Result<ActionResponse, ApiError>;
}
