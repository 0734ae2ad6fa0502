// ABOUTME: Script interpreter capability for single-file interpreted fragments
// ABOUTME: Runs source directly without a project filesystem and captures its output

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use fragments_config::PreviewConfig;

use crate::error::{SandboxError, SandboxResult};

/// Captured result of running a script
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ScriptOutput {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes interpreted-language source and captures what it prints
#[async_trait]
pub trait ScriptInterpreter: Send + Sync {
    async fn execute(&self, source: &str) -> SandboxResult<ScriptOutput>;
}

/// Runs Python source through a local interpreter binary (`python3 -c`)
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    python_bin: String,
}

impl PythonInterpreter {
    pub fn new(python_bin: impl Into<String>) -> Self {
        Self {
            python_bin: python_bin.into(),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.python_bin.clone())
    }
}

#[async_trait]
impl ScriptInterpreter for PythonInterpreter {
    async fn execute(&self, source: &str) -> SandboxResult<ScriptOutput> {
        let started = Instant::now();
        debug!("Running {} bytes of Python with {}", source.len(), self.python_bin);

        let output = Command::new(&self.python_bin)
            .arg("-c")
            .arg(source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SandboxError::Interpreter(format!("failed to start {}: {}", self.python_bin, e))
            })?;

        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
