use chrono::{DateTime, Utc};
use fragments_sandbox::SandboxError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Target shown by the render surface when nothing is running
pub const BLANK_TARGET: &str = "about:blank";

/// The only permissions granted to the embedded frame
pub const FRAME_PERMISSIONS: [&str; 3] = ["allow-forms", "allow-scripts", "allow-same-origin"];

/// Status of a project runtime session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeStatus {
    #[default]
    Idle,
    Installing,
    Running,
    Error,
}

impl RuntimeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeStatus::Idle => "idle",
            RuntimeStatus::Installing => "installing",
            RuntimeStatus::Running => "running",
            RuntimeStatus::Error => "error",
        }
    }

    /// Run control is disabled while installing or running
    pub fn can_run(&self) -> bool {
        !matches!(self, RuntimeStatus::Installing | RuntimeStatus::Running)
    }

    /// Stop control is enabled whenever the session is not idle
    pub fn can_stop(&self) -> bool {
        *self != RuntimeStatus::Idle
    }
}

/// Snapshot of a project runtime session.
///
/// `server_url` is non-empty exactly when `status` is [`RuntimeStatus::Running`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSession {
    pub run_id: Option<Uuid>,
    pub status: RuntimeStatus,
    pub message: String,
    pub server_url: String,
}

impl RuntimeSession {
    /// Text for the status line next to the run/stop controls
    pub fn status_line(&self) -> &str {
        match self.status {
            RuntimeStatus::Idle => "Ready",
            RuntimeStatus::Installing | RuntimeStatus::Error => self.message.as_str(),
            RuntimeStatus::Running if self.server_url.is_empty() => "Running...",
            RuntimeStatus::Running => self.server_url.as_str(),
        }
    }
}

/// The embedded, sandboxed frame a preview renders into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSurface {
    pub target: String,
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::blank()
    }
}

impl RenderSurface {
    pub fn blank() -> Self {
        Self {
            target: BLANK_TARGET.to_string(),
        }
    }

    pub fn at(url: impl Into<String>) -> Self {
        Self { target: url.into() }
    }

    pub fn navigate(&mut self, url: &str) {
        self.target = url.to_string();
    }

    pub fn reset(&mut self) {
        self.target = BLANK_TARGET.to_string();
    }

    pub fn is_blank(&self) -> bool {
        self.target == BLANK_TARGET
    }

    /// Value for the frame's `sandbox` attribute
    pub fn sandbox_attribute(&self) -> String {
        FRAME_PERMISSIONS.join(" ")
    }
}

/// Log entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Stdout,
    Stderr,
    System,
}

/// Runtime log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeLog {
    pub timestamp: DateTime<Utc>,
    pub log_type: LogType,
    pub message: String,
}

/// Events broadcast by a project runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Status { session: RuntimeSession },
    Log { log: RuntimeLog },
}

/// Error types for preview operations
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("This project is missing multiple files. Ask to generate a full project with package.json.")]
    MissingProjectFiles,

    #[error("No package.json found. Ask to generate a full Next.js project including package.json.")]
    MissingPackageJson,

    #[error("{command} failed with exit code {exit_code}")]
    InstallFailed { command: String, exit_code: i32 },

    #[error("Dev server did not become ready within {timeout:?}")]
    ReadyTimeout { timeout: Duration },

    #[error("Sandbox closed before the dev server became ready")]
    SandboxClosed,

    #[error("Run was detached by stop")]
    Detached,

    #[error("This fragment has no script source to run")]
    MissingScriptSource,

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Template {0} never produces an execution result")]
    UnsupportedResultTemplate(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Result type for preview operations
pub type PreviewResult<T> = Result<T, PreviewError>;
