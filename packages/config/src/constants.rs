// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names used by the preview stack

// Readiness
pub const FRAGMENTS_READY_TIMEOUT_SECS: &str = "FRAGMENTS_READY_TIMEOUT_SECS";

// Process Spawning
pub const FRAGMENTS_SHELL: &str = "FRAGMENTS_SHELL";
pub const FRAGMENTS_DEFAULT_INSTALL_COMMAND: &str = "FRAGMENTS_DEFAULT_INSTALL_COMMAND";
pub const FRAGMENTS_PYTHON_BIN: &str = "FRAGMENTS_PYTHON_BIN";

// Local Sandbox
pub const FRAGMENTS_SANDBOX_ROOT: &str = "FRAGMENTS_SANDBOX_ROOT";

// Runtime Buffers
pub const FRAGMENTS_LOG_CAPACITY: &str = "FRAGMENTS_LOG_CAPACITY";
pub const FRAGMENTS_EVENT_CHANNEL_SIZE: &str = "FRAGMENTS_EVENT_CHANNEL_SIZE";
