//! Wire payloads the core depends on. Field names match the server's
//! snake_case JSON.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::FlowItem;
use crate::jobs::TrackStatus;

/// Result of a single capture upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub capture_id: String,
    pub filename: String,
    pub timestamp: DateTime<Utc>,
    pub trigger: String,
}

/// Links queued captures to an assessment record. The response-id array
/// is aligned with `capture_ids`; entries are null for captures taken
/// outside any response window. Only one of the two id arrays is sent,
/// matching the assessment kind.
///
/// The server is required to treat this endpoint as idempotent across
/// overlapping capture-id sets, since a failed link is retried with the
/// full queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    pub capture_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phq_response_ids: Option<Vec<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_conversation_ids: Option<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkResponse {
    pub success: bool,
}

/// Status of one remote analysis job, polled per (session, kind).
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: TrackStatus,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchStats {
    pub queued: u32,
    pub processing: u32,
    pub completed: u32,
    pub failed: u32,
}

/// Fleet-wide batch status snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchStatusResponse {
    pub is_running: bool,
    pub total: u32,
    #[serde(default)]
    pub stats: BatchStats,
    #[serde(default)]
    pub progress_percentage: Option<f64>,
}

/// Generic outcome of an operator action (process/cancel/reanalyze/
/// delete). `success: false` with a message is a no-op report, not a
/// failure.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchStartResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_ids: Vec<String>,
}

/// Everything the client needs to start or resume an assessment flow.
/// The server owns resume semantics: `resume_index` and `saved_answers`
/// are authoritative and never recomputed locally.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowBootstrap {
    pub assessment_id: String,
    pub items: Vec<FlowItem>,
    #[serde(default)]
    pub resume_index: usize,
    #[serde(default)]
    pub saved_answers: HashMap<String, String>,
}
