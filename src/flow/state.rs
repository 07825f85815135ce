use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::api::FlowBootstrap;

/// One question or chat turn in the ordered sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowItem {
    pub id: String,
    pub prompt: String,
}

/// Resumable progression over an ordered item list.
///
/// The server owns resume semantics: cursor and saved answers come from
/// the bootstrap payload and are never recomputed from partial local
/// state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    pub assessment_id: String,
    pub items: Vec<FlowItem>,
    pub cursor: usize,
    pub answers: HashMap<String, String>,
    pub submitted: bool,
}

impl FlowState {
    pub fn from_bootstrap(bootstrap: FlowBootstrap) -> Self {
        let cursor = bootstrap.resume_index.min(bootstrap.items.len());
        Self {
            assessment_id: bootstrap.assessment_id,
            items: bootstrap.items,
            cursor,
            answers: bootstrap.saved_answers,
            submitted: false,
        }
    }

    pub fn current(&self) -> Option<&FlowItem> {
        self.items.get(self.cursor)
    }

    /// Whether the cursor sits on the final item.
    pub fn at_last_item(&self) -> bool {
        !self.items.is_empty() && self.cursor + 1 == self.items.len()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn record_answer(&mut self, item_id: impl Into<String>, value: impl Into<String>) {
        self.answers.insert(item_id.into(), value.into());
    }

    pub fn advance(&mut self) -> Option<&FlowItem> {
        if self.cursor < self.items.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn answered(&self) -> usize {
        self.answers.len()
    }
}
