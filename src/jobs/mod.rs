pub mod actions;
pub mod combined;
pub mod poller;
pub mod track;

pub use actions::{ActionOutcome, AnalysisController};
pub use combined::{combine, SessionAnalysisStatus};
pub use poller::{PollerConfig, PollerRegistry, SessionJobPoller, TrackTaskIds};
pub use track::{JobTrack, TrackStatus, Transition};
