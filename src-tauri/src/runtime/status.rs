//! Typesafe events and query results describing runtime readiness.
//!
//! [`RuntimeStatus`] and [`DownloadProgress`] are pushed to the webview as
//! they happen; [`RuntimeReadiness`] is recomputed whenever the UI asks.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tauri::AppHandle;
use tauri_specta::Event;

/// Lifecycle status broadcast to the UI after every stage transition
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    specta::Type,
    tauri_specta::Event,
    strum::EnumDiscriminants,
)]
#[serde(tag = "status", rename_all = "lowercase")]
#[strum_discriminants(name(StatusKind), derive(Hash))]
pub enum RuntimeStatus {
    Checking { message: String },
    Installing { message: String },
    Starting { message: String },
    Downloading { message: String },
    Ready { message: String },
    Error { message: String },
    Waiting { message: String },
}

impl RuntimeStatus {
    pub fn checking(message: impl Into<String>) -> Self {
        Self::Checking {
            message: message.into(),
        }
    }

    pub fn installing(message: impl Into<String>) -> Self {
        Self::Installing {
            message: message.into(),
        }
    }

    pub fn starting(message: impl Into<String>) -> Self {
        Self::Starting {
            message: message.into(),
        }
    }

    pub fn downloading(message: impl Into<String>) -> Self {
        Self::Downloading {
            message: message.into(),
        }
    }

    pub fn ready(message: impl Into<String>) -> Self {
        Self::Ready {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn waiting(message: impl Into<String>) -> Self {
        Self::Waiting {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.into()
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Checking { message }
            | Self::Installing { message }
            | Self::Starting { message }
            | Self::Downloading { message }
            | Self::Ready { message }
            | Self::Error { message }
            | Self::Waiting { message } => message,
        }
    }
}

/// Model pull progress. `progress` is 0..=100, or -1 after a reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
pub struct DownloadProgress {
    pub progress: i32,
    pub message: String,
}

impl DownloadProgress {
    pub const FAILED: i32 = -1;

    pub fn new(progress: i32, message: impl Into<String>) -> Self {
        Self {
            progress: progress.clamp(0, 100),
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            progress: Self::FAILED,
            message: message.into(),
        }
    }
}

/// Composite readiness, re-derived from the system on every query.
///
/// `server_running` implies `installed`, and `model_ready` implies
/// `server_running`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeReadiness {
    #[serde(rename = "ollamaInstalled")]
    pub installed: bool,
    pub server_running: bool,
    pub model_ready: bool,
    pub error: Option<String>,
}

impl RuntimeReadiness {
    pub fn is_ready(&self) -> bool {
        self.installed && self.server_running && self.model_ready
    }
}

/// Push-event projection of a readiness snapshot
impl From<&RuntimeReadiness> for RuntimeStatus {
    fn from(readiness: &RuntimeReadiness) -> Self {
        if let Some(error) = &readiness.error {
            RuntimeStatus::error(error.clone())
        } else if !readiness.installed {
            RuntimeStatus::waiting("Ollama is not installed")
        } else if !readiness.server_running {
            RuntimeStatus::waiting("Ollama server is not running")
        } else if !readiness.model_ready {
            RuntimeStatus::waiting("Model download required")
        } else {
            RuntimeStatus::ready("Ready")
        }
    }
}

/// Model-only readiness query result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ModelReadiness {
    pub model_name: String,
    pub model_ready: bool,
    pub error: Option<String>,
}

/// `{ success, error? }` envelope returned by action commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, specta::Type)]
pub struct CommandOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl CommandOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for CommandOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

/// Receives lifecycle notifications
pub trait StatusSink: Send + Sync {
    fn status(&self, status: RuntimeStatus);
    fn progress(&self, progress: DownloadProgress);
}

/// [`StatusSink`] that emits typed events to every webview
pub struct AppStatusSink {
    app: AppHandle,
}

impl AppStatusSink {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

impl StatusSink for AppStatusSink {
    fn status(&self, status: RuntimeStatus) {
        info!("Runtime status: {:?} - {}", status.kind(), status.message());
        if let Err(e) = status.emit(&self.app) {
            warn!("Failed to emit runtime status: {}", e);
        }
    }

    fn progress(&self, progress: DownloadProgress) {
        if let Err(e) = progress.emit(&self.app) {
            warn!("Failed to emit download progress: {}", e);
        }
    }
}
