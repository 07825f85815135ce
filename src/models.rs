//! Shared identifiers and enums used across the capture and analysis
//! subsystems.

use serde::{Deserialize, Serialize};

/// The two assessment types the platform runs per session. Each has its
/// own remote facial-analysis job and its own response/turn vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssessmentKind {
    #[serde(rename = "PHQ")]
    Phq,
    #[serde(rename = "LLM")]
    Llm,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Phq => "PHQ",
            AssessmentKind::Llm => "LLM",
        }
    }

    /// Both kinds, in the fixed order the rest of the crate assumes
    /// (PHQ first, LLM second).
    pub fn both() -> [AssessmentKind; 2] {
        [AssessmentKind::Phq, AssessmentKind::Llm]
    }
}

impl std::fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
