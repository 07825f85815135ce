use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// How captures are scheduled for a session. The two modes are mutually
/// exclusive; a session is configured with exactly one (or none).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CaptureMode {
    /// A single recurring timer drives captures.
    Interval,
    /// Captures fire from named interaction events.
    EventDriven,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Per-session capture configuration. The event flags only matter in
/// event-driven mode; `interval_secs` only matters in interval mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    pub mode: Option<CaptureMode>,
    pub interval_secs: u64,
    pub on_button_click: bool,
    pub on_message_send: bool,
    pub on_question_start: bool,
    pub resolution: Option<Resolution>,
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            mode: None,
            interval_secs: 10,
            on_button_click: false,
            on_message_send: false,
            on_question_start: false,
            resolution: None,
            jpeg_quality: 80,
        }
    }
}

impl CaptureConfig {
    pub fn interval(interval_secs: u64) -> Self {
        Self {
            mode: Some(CaptureMode::Interval),
            interval_secs,
            ..Self::default()
        }
    }

    pub fn event_driven(
        on_button_click: bool,
        on_message_send: bool,
        on_question_start: bool,
    ) -> Self {
        Self {
            mode: Some(CaptureMode::EventDriven),
            on_button_click,
            on_message_send,
            on_question_start,
            ..Self::default()
        }
    }

    pub fn resolution_or_default(&self) -> Resolution {
        self.resolution.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    pub base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClientSettings {
    server: ServerSettings,
    capture: CaptureConfig,
}

/// File-backed settings with in-memory reads. Unreadable or missing
/// files fall back to defaults rather than failing startup.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<ClientSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            ClientSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn server(&self) -> ServerSettings {
        self.data.read().unwrap().server.clone()
    }

    pub fn capture(&self) -> CaptureConfig {
        self.data.read().unwrap().capture.clone()
    }

    pub fn update_capture(&self, capture: CaptureConfig) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.capture = capture;
        self.persist(&guard)
    }

    pub fn update_server(&self, server: ServerSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.server = server;
        self.persist(&guard)
    }

    fn persist(&self, data: &ClientSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

/// Debug switch shared by the polling loops: shortens periods so a dev
/// build resolves in seconds instead of minutes.
pub fn debug_mode() -> bool {
    std::env::var("MINDLENS_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
