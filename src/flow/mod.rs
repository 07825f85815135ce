pub mod controller;
pub mod state;

pub use controller::{FlowCompletion, FlowSnapshot, FlowStep, SessionFlowController};
pub use state::{FlowItem, FlowState};
