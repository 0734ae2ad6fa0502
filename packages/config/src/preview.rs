// ABOUTME: Preview runtime configuration loaded from the environment
// ABOUTME: Shell, default install command, readiness timeout, buffer sizes and local sandbox paths

use crate::constants::*;
use crate::env::{env_string, parse_env_or_default_with_validation};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SHELL: &str = "bash";
pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";
pub const DEFAULT_PYTHON_BIN: &str = "python3";
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const DEFAULT_EVENT_CHANNEL_SIZE: usize = 200;

/// Settings shared by every backend mounted by a preview dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewConfig {
    /// Shell used to run install and dev-server commands (`<shell> -lc "<cmd>"`)
    pub shell: String,
    /// Install command used when the fragment does not carry one
    pub default_install_command: String,
    /// How long to wait for the dev server to report readiness. `None` waits forever.
    pub ready_timeout: Option<Duration>,
    /// Maximum number of log lines retained per runtime
    pub log_capacity: usize,
    /// Capacity of the runtime event broadcast channel
    pub event_channel_size: usize,
    /// Interpreter binary for single-file script fragments
    pub python_bin: String,
    /// Parent directory for local sandbox filesystems (system temp dir when unset)
    pub sandbox_root: Option<PathBuf>,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            default_install_command: DEFAULT_INSTALL_COMMAND.to_string(),
            ready_timeout: None,
            log_capacity: DEFAULT_LOG_CAPACITY,
            event_channel_size: DEFAULT_EVENT_CHANNEL_SIZE,
            python_bin: DEFAULT_PYTHON_BIN.to_string(),
            sandbox_root: None,
        }
    }
}

impl PreviewConfig {
    /// Build a config from `FRAGMENTS_*` environment variables.
    ///
    /// Invalid values are logged and replaced with defaults; this never fails.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        // 0 disables the timeout
        let ready_timeout_secs =
            parse_env_or_default_with_validation(FRAGMENTS_READY_TIMEOUT_SECS, 0u64, |v| {
                v <= 24 * 60 * 60
            });

        let log_capacity = parse_env_or_default_with_validation(
            FRAGMENTS_LOG_CAPACITY,
            defaults.log_capacity,
            |v| (1..=100_000).contains(&v),
        );

        let event_channel_size = parse_env_or_default_with_validation(
            FRAGMENTS_EVENT_CHANNEL_SIZE,
            defaults.event_channel_size,
            |v| (10..=10000).contains(&v),
        );

        Self {
            shell: env_string(FRAGMENTS_SHELL).unwrap_or(defaults.shell),
            default_install_command: env_string(FRAGMENTS_DEFAULT_INSTALL_COMMAND)
                .unwrap_or(defaults.default_install_command),
            ready_timeout: (ready_timeout_secs > 0).then(|| Duration::from_secs(ready_timeout_secs)),
            log_capacity,
            event_channel_size,
            python_bin: env_string(FRAGMENTS_PYTHON_BIN).unwrap_or(defaults.python_bin),
            sandbox_root: env_string(FRAGMENTS_SANDBOX_ROOT).map(PathBuf::from),
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = Some(timeout);
        self
    }
}
