use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};

use fragments_sandbox::{ScriptInterpreter, ScriptOutput};

use crate::fragment::FragmentDescriptor;
use crate::types::PreviewError;

/// Lifecycle of a single-file script run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptState {
    pub status: ScriptStatus,
    /// Captured output of the last completed run
    pub output: Option<ScriptOutput>,
    pub error: Option<String>,
}

/// Runs an interpreted-script fragment through the injected interpreter.
///
/// A non-zero exit still completes the run; the exit code is in the output.
/// Only a failure to execute at all is an error.
#[derive(Clone)]
pub struct ScriptPreview {
    interpreter: Arc<dyn ScriptInterpreter>,
    fragment: Arc<RwLock<FragmentDescriptor>>,
    run: Arc<RwLock<ScriptRun>>,
}

#[derive(Default)]
struct ScriptRun {
    epoch: u64,
    state: ScriptState,
    /// Execution task of the in-flight run
    task: Option<AbortHandle>,
}

impl ScriptPreview {
    pub fn new(interpreter: Arc<dyn ScriptInterpreter>, fragment: FragmentDescriptor) -> Self {
        Self {
            interpreter,
            fragment: Arc::new(RwLock::new(fragment)),
            run: Arc::new(RwLock::new(ScriptRun::default())),
        }
    }

    pub async fn state(&self) -> ScriptState {
        self.run.read().await.state.clone()
    }

    pub async fn fragment(&self) -> FragmentDescriptor {
        self.fragment.read().await.clone()
    }

    /// Replace the fragment; a changed source resets the run state
    pub async fn set_fragment(&self, fragment: FragmentDescriptor) {
        let changed = {
            let mut current = self.fragment.write().await;
            let changed = current.script_source() != fragment.script_source();
            *current = fragment;
            changed
        };

        if changed {
            self.stop().await;
        }
    }

    /// Execute the fragment's source and return the resulting state.
    /// Ignored while a run is already in progress.
    pub async fn run(&self) -> ScriptState {
        let source = self.fragment.read().await.script_source().map(str::to_string);

        let (epoch, task) = {
            let mut run = self.run.write().await;
            if run.state.status == ScriptStatus::Running {
                debug!("Ignoring run while script is running");
                return run.state.clone();
            }

            run.epoch += 1;
            let Some(source) = source else {
                run.state = ScriptState {
                    status: ScriptStatus::Error,
                    output: None,
                    error: Some(PreviewError::MissingScriptSource.to_string()),
                };
                return run.state.clone();
            };

            run.state = ScriptState {
                status: ScriptStatus::Running,
                ..Default::default()
            };
            let interpreter = self.interpreter.clone();
            let task = tokio::spawn(async move { interpreter.execute(&source).await });
            run.task = Some(task.abort_handle());
            (run.epoch, task)
        };

        let result = task.await;

        let mut run = self.run.write().await;
        if run.epoch != epoch {
            debug!("Discarding output of a stopped script run");
            return run.state.clone();
        }
        run.task = None;

        match result {
            Ok(Ok(output)) => {
                info!(
                    "Script finished with exit code {} in {}ms",
                    output.exit_code, output.duration_ms
                );
                run.state.status = ScriptStatus::Completed;
                run.state.output = Some(output);
            }
            Ok(Err(e)) => {
                error!("Script execution failed: {}", e);
                run.state.status = ScriptStatus::Error;
                run.state.error = Some(e.to_string());
            }
            Err(e) => {
                error!("Script task ended abnormally: {}", e);
                run.state.status = ScriptStatus::Error;
                run.state.error = Some(e.to_string());
            }
        }
        run.state.clone()
    }

    /// Return to idle, aborting any in-flight run
    pub async fn stop(&self) {
        let mut run = self.run.write().await;
        if run.task.is_none() && run.state == ScriptState::default() {
            return;
        }

        run.epoch += 1;
        run.state = ScriptState::default();
        if let Some(task) = run.task.take() {
            // Dropping the execution kills the interpreter process
            task.abort();
            debug!("Aborted in-flight script run");
        }
    }
}
