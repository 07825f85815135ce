//! Pure decision function mapping a trigger event to capture/skip.

use serde::{Deserialize, Serialize};

use crate::config::{CaptureConfig, CaptureMode};

/// Named events that may cause a camera capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Interval,
    ButtonClick,
    MessageSend,
    QuestionStart,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Interval => "interval",
            TriggerKind::ButtonClick => "button_click",
            TriggerKind::MessageSend => "message_send",
            TriggerKind::QuestionStart => "question_start",
        }
    }

    pub const ALL: [TriggerKind; 4] = [
        TriggerKind::Interval,
        TriggerKind::ButtonClick,
        TriggerKind::MessageSend,
        TriggerKind::QuestionStart,
    ];
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless and total: every (trigger, config) pair maps to a bool.
///
/// Interval mode fires only on the interval tick; event-driven mode
/// fires only on events whose flag is set; a missing mode never fires.
pub fn should_capture(trigger: TriggerKind, config: &CaptureConfig) -> bool {
    match config.mode {
        Some(CaptureMode::Interval) => trigger == TriggerKind::Interval,
        Some(CaptureMode::EventDriven) => match trigger {
            TriggerKind::Interval => false,
            TriggerKind::ButtonClick => config.on_button_click,
            TriggerKind::MessageSend => config.on_message_send,
            TriggerKind::QuestionStart => config.on_question_start,
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_mode_fires_only_on_interval() {
        let config = CaptureConfig::interval(5);
        assert!(should_capture(TriggerKind::Interval, &config));
        assert!(!should_capture(TriggerKind::ButtonClick, &config));
        assert!(!should_capture(TriggerKind::MessageSend, &config));
        assert!(!should_capture(TriggerKind::QuestionStart, &config));
    }

    #[test]
    fn event_mode_never_fires_on_interval() {
        let config = CaptureConfig::event_driven(true, true, true);
        assert!(!should_capture(TriggerKind::Interval, &config));
        assert!(should_capture(TriggerKind::ButtonClick, &config));
        assert!(should_capture(TriggerKind::MessageSend, &config));
        assert!(should_capture(TriggerKind::QuestionStart, &config));
    }

    #[test]
    fn event_mode_respects_individual_flags() {
        let config = CaptureConfig::event_driven(false, true, false);
        assert!(!should_capture(TriggerKind::ButtonClick, &config));
        assert!(should_capture(TriggerKind::MessageSend, &config));
        assert!(!should_capture(TriggerKind::QuestionStart, &config));
    }

    #[test]
    fn missing_mode_never_captures() {
        let config = CaptureConfig::default();
        for trigger in TriggerKind::ALL {
            assert!(!should_capture(trigger, &config));
        }
    }

    #[test]
    fn same_inputs_same_answer() {
        let configs = [
            CaptureConfig::default(),
            CaptureConfig::interval(1),
            CaptureConfig::event_driven(true, false, true),
        ];
        for config in &configs {
            for trigger in TriggerKind::ALL {
                let first = should_capture(trigger, config);
                let second = should_capture(trigger, config);
                assert_eq!(first, second);
            }
        }
    }
}
