pub mod buffer;
pub mod frame;
pub mod policy;

pub use buffer::{CaptureBuffer, CaptureOutcome, CaptureRecord, CaptureRegistry, CaptureStats};
pub use frame::{encode_jpeg, CameraError, FrameSource, RawFrame};
pub use policy::{should_capture, TriggerKind};
