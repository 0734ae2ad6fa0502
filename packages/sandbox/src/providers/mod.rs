// ABOUTME: Sandbox capability traits consumed by the preview orchestrator
// ABOUTME: Defines boot, filesystem, process spawning, readiness notification and teardown

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::error::{SandboxError, SandboxResult};

pub mod local;

pub use local::{LocalSandbox, LocalSandboxRuntime};

/// Options for [`SandboxInstance::mkdir`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MkdirOptions {
    /// Create missing parents and tolerate an existing directory
    pub recursive: bool,
}

impl MkdirOptions {
    pub fn recursive() -> Self {
        Self { recursive: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// One line of process output
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub timestamp: DateTime<Utc>,
    pub stream: StreamType,
    pub data: String,
}

/// Combined stdout/stderr of a spawned process
pub struct OutputStream {
    pub receiver: mpsc::UnboundedReceiver<OutputChunk>,
}

/// Resolves once with the exit code of a spawned process
pub struct ExitStatus {
    command: String,
    receiver: oneshot::Receiver<i32>,
}

impl ExitStatus {
    pub fn new(command: impl Into<String>, receiver: oneshot::Receiver<i32>) -> Self {
        Self {
            command: command.into(),
            receiver,
        }
    }

    /// Wait for the process to exit
    pub async fn wait(self) -> SandboxResult<i32> {
        self.receiver
            .await
            .map_err(|_| SandboxError::ExitUnavailable {
                command: self.command,
            })
    }
}

/// Handle returned by [`SandboxInstance::spawn`]
pub struct ProcessHandle {
    pub output: OutputStream,
    pub exit: ExitStatus,
}

/// Notification that a spawned server started listening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Produces fresh, isolated sandbox instances
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Boot a new instance. Instances are never shared between runs.
    async fn boot(&self) -> SandboxResult<Arc<dyn SandboxInstance>>;
}

/// A booted sandbox with a virtual filesystem and process spawning
#[async_trait]
pub trait SandboxInstance: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// Create a directory at a sandbox-absolute path
    async fn mkdir(&self, path: &str, options: MkdirOptions) -> SandboxResult<()>;

    /// Write a file at a sandbox-absolute path, replacing any existing content
    async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()>;

    /// Start a process inside the sandbox without waiting for it
    async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle>;

    /// Subscribe to server-ready notifications emitted by spawned processes
    fn on_server_ready(&self) -> broadcast::Receiver<ServerReady>;

    /// Stop every process and release the instance
    async fn teardown(&self) -> SandboxResult<()>;
}
