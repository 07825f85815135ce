//! mindlens — capture-and-processing core of a psychological-assessment
//! platform client.
//!
//! The embedding UI shell owns rendering and the platform camera API;
//! this crate owns capture scheduling and upload, the per-session
//! analysis poll loops, fleet-wide batch progress, and the resumable
//! assessment flow. All server communication goes through
//! [`api::AssessmentApi`]; the UI observes the core through
//! [`events::EventBus`].

pub mod api;
pub mod batch;
pub mod capture;
pub mod config;
pub mod events;
pub mod flow;
pub mod jobs;
pub mod models;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, AssessmentApi, HttpApi};
pub use batch::{BatchConfig, BatchOrchestrator, BatchSnapshot};
pub use capture::{
    CameraError, CaptureBuffer, CaptureOutcome, CaptureRecord, CaptureRegistry, CaptureStats,
    FrameSource, RawFrame, TriggerKind,
};
pub use config::{CaptureConfig, CaptureMode, Resolution, ServerSettings, SettingsStore};
pub use events::{BatchEndReason, CoreEvent, EventBus};
pub use flow::{FlowCompletion, FlowItem, FlowSnapshot, FlowStep, SessionFlowController};
pub use jobs::{
    ActionOutcome, AnalysisController, JobTrack, PollerConfig, PollerRegistry,
    SessionAnalysisStatus, SessionJobPoller, TrackStatus, TrackTaskIds,
};
pub use models::AssessmentKind;
