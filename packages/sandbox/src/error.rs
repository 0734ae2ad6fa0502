// ABOUTME: Error types for sandbox operations
// ABOUTME: Covers boot, filesystem, process spawning, teardown and interpreter failures

use thiserror::Error;

/// Main error type for sandbox operations
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The sandbox runtime could not produce an instance
    #[error("Sandbox failed to boot: {0}")]
    BootFailed(String),

    /// A sandbox path was rejected by the backend
    #[error("Invalid sandbox path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A filesystem call inside the sandbox failed
    #[error("Filesystem error at '{path}': {error}")]
    Filesystem { path: String, error: String },

    /// A process could not be started
    #[error("Failed to spawn process '{command}': {error}")]
    ProcessSpawnError { command: String, error: String },

    /// The process went away without reporting an exit code
    #[error("Process '{command}' ended without an exit status")]
    ExitUnavailable { command: String },

    /// The instance was torn down and can no longer be used
    #[error("Sandbox {0} has been torn down")]
    TornDown(String),

    /// Script interpreter failure
    #[error("Interpreter error: {0}")]
    Interpreter(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for Results that return SandboxError
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
