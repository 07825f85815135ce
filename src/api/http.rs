use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::capture::TriggerKind;
use crate::models::AssessmentKind;

use super::envelope;
use super::error::ApiError;
use super::types::{
    ActionResponse, BatchStartResponse, BatchStatusResponse, FlowBootstrap, JobStatusResponse,
    LinkRequest, LinkResponse, UploadResponse,
};
use super::AssessmentApi;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// reqwest-backed implementation of [`AssessmentApi`].
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn kind_segment(kind: AssessmentKind) -> &'static str {
        match kind {
            AssessmentKind::Phq => "phq",
            AssessmentKind::Llm => "llm",
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        match envelope::decode(&body) {
            Ok(value) => Ok(value),
            Err(err @ ApiError::Rejected(_)) => Err(err),
            Err(_) if !status.is_success() => {
                Err(ApiError::Protocol(format!("http {status}: unexpected body")))
            }
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl AssessmentApi for HttpApi {
    async fn upload_capture(
        &self,
        session_id: &str,
        kind: AssessmentKind,
        trigger: TriggerKind,
        jpeg: Vec<u8>,
    ) -> Result<UploadResponse, ApiError> {
        let filename = format!(
            "capture_{}_{}.jpg",
            session_id,
            Utc::now().timestamp_millis()
        );
        let image = Part::bytes(jpeg)
            .file_name(filename)
            .mime_str("image/jpeg")
            .map_err(|err| ApiError::Protocol(format!("multipart: {err}")))?;

        let form = Form::new()
            .part("image", image)
            .text("trigger", trigger.as_str())
            .text("assessment_type", kind.as_str());

        let request = self
            .client
            .post(self.url(&format!("/api/sessions/{session_id}/captures")))
            .multipart(form);

        self.send_json(request).await
    }

    async fn link_captures(&self, request: &LinkRequest) -> Result<LinkResponse, ApiError> {
        let request = self
            .client
            .post(self.url("/api/captures/link"))
            .json(request);
        self.send_json(request).await
    }

    async fn job_status(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<JobStatusResponse, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.get(self.url(&format!(
            "/api/sessions/{session_id}/analysis/{segment}/status"
        )));
        self.send_json(request).await
    }

    async fn process_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.post(self.url(&format!(
            "/api/sessions/{session_id}/analysis/{segment}/process"
        )));
        self.send_json(request).await
    }

    async fn cancel_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.post(self.url(&format!(
            "/api/sessions/{session_id}/analysis/{segment}/cancel"
        )));
        self.send_json(request).await
    }

    async fn reanalyze(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.post(self.url(&format!(
            "/api/sessions/{session_id}/analysis/{segment}/reanalyze"
        )));
        self.send_json(request).await
    }

    async fn delete_analysis(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<ActionResponse, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.delete(self.url(&format!(
            "/api/sessions/{session_id}/analysis/{segment}"
        )));
        self.send_json(request).await
    }

    async fn start_batch(&self) -> Result<BatchStartResponse, ApiError> {
        let request = self.client.post(self.url("/api/analysis/batch/start"));
        self.send_json(request).await
    }

    async fn cancel_batch(&self) -> Result<ActionResponse, ApiError> {
        let request = self.client.post(self.url("/api/analysis/batch/cancel"));
        self.send_json(request).await
    }

    async fn batch_status(&self) -> Result<BatchStatusResponse, ApiError> {
        let request = self.client.get(self.url("/api/analysis/batch/status"));
        self.send_json(request).await
    }

    async fn start_assessment(
        &self,
        session_id: &str,
        kind: AssessmentKind,
    ) -> Result<FlowBootstrap, ApiError> {
        let segment = Self::kind_segment(kind);
        let request = self.client.post(self.url(&format!(
            "/api/sessions/{session_id}/assessments/{segment}/start"
        )));
        self.send_json(request).await
    }

    async fn save_answer(
        &self,
        assessment_id: &str,
        item_id: &str,
        value: &str,
    ) -> Result<ActionResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/api/assessments/{assessment_id}/answers")))
            .json(&json!({ "item_id": item_id, "value": value }));
        self.send_json(request).await
    }

    async fn submit_assessment(
        &self,
        assessment_id: &str,
        answers: &HashMap<String, String>,
    ) -> Result<ActionResponse, ApiError> {
        let request = self
            .client
            .post(self.url(&format!("/api/assessments/{assessment_id}/submit")))
            .json(&json!({ "answers": answers }));
        self.send_json(request).await
    }
}
