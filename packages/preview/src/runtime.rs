use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fragments_config::PreviewConfig;
use fragments_sandbox::{
    MkdirOptions, OutputStream, ProcessHandle, SandboxInstance, SandboxRuntime, ServerReady,
    StreamType,
};

use crate::detector::{ProjectCommands, ProjectDetector};
use crate::fragment::{FragmentDescriptor, ProjectFile};
use crate::types::*;

const BOOTING_MESSAGE: &str = "Booting sandbox...";
const INSTALLING_MESSAGE: &str = "Installing dependencies...";
const STARTING_MESSAGE: &str = "Starting dev server...";

struct SessionState {
    session: RuntimeSession,
    surface: RenderSurface,
    /// Bumped by every run and stop. Pipelines holding an older epoch are stale.
    epoch: u64,
    instance: Option<Arc<dyn SandboxInstance>>,
    ready_task: Option<JoinHandle<()>>,
}

/// Drives a multi-file project through boot, write, install, dev server and readiness.
///
/// A runtime owns exactly one session and at most one sandbox instance at a time.
/// `run` never returns an error: every failure is captured into the session as
/// [`RuntimeStatus::Error`] with a human-readable message.
#[derive(Clone)]
pub struct ProjectRuntime {
    sandbox: Arc<dyn SandboxRuntime>,
    config: Arc<PreviewConfig>,
    fragment: Arc<RwLock<FragmentDescriptor>>,
    state: Arc<RwLock<SessionState>>,
    logs: Arc<RwLock<VecDeque<RuntimeLog>>>,
    event_tx: broadcast::Sender<RuntimeEvent>,
}

impl ProjectRuntime {
    pub fn new(
        sandbox: Arc<dyn SandboxRuntime>,
        config: Arc<PreviewConfig>,
        fragment: FragmentDescriptor,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_size);
        Self {
            sandbox,
            config,
            fragment: Arc::new(RwLock::new(fragment)),
            state: Arc::new(RwLock::new(SessionState {
                session: RuntimeSession::default(),
                surface: RenderSurface::blank(),
                epoch: 0,
                instance: None,
                ready_task: None,
            })),
            logs: Arc::new(RwLock::new(VecDeque::new())),
            event_tx,
        }
    }

    /// Subscribe to status and log events
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.event_tx.subscribe()
    }

    pub async fn session(&self) -> RuntimeSession {
        self.state.read().await.session.clone()
    }

    pub async fn surface(&self) -> RenderSurface {
        self.state.read().await.surface.clone()
    }

    pub async fn status_line(&self) -> String {
        self.state.read().await.session.status_line().to_string()
    }

    pub async fn can_run(&self) -> bool {
        self.state.read().await.session.status.can_run()
    }

    pub async fn can_stop(&self) -> bool {
        self.state.read().await.session.status.can_stop()
    }

    pub async fn fragment(&self) -> FragmentDescriptor {
        self.fragment.read().await.clone()
    }

    /// Replace the fragment. A session built from a different template or file
    /// set is stopped.
    pub async fn set_fragment(&self, fragment: FragmentDescriptor) {
        let changed = {
            let mut current = self.fragment.write().await;
            let changed = current.template != fragment.template
                || current.project_files() != fragment.project_files();
            *current = fragment;
            changed
        };

        if changed {
            debug!("Fragment changed, resetting project session");
            self.stop().await;
        }
    }

    /// Start a run. Ignored while a run is installing or running.
    pub async fn run(&self) {
        let fragment = self.fragment.read().await.clone();
        let prepared = prepare(&fragment, &self.config);

        let (epoch, previous, ready_task) = {
            let mut state = self.state.write().await;
            if !state.session.status.can_run() {
                debug!(
                    "Ignoring run while session is {}",
                    state.session.status.as_str()
                );
                return;
            }

            state.epoch += 1;
            state.session.run_id = Some(Uuid::new_v4());
            if prepared.is_ok() {
                state.session.status = RuntimeStatus::Installing;
                state.session.message = BOOTING_MESSAGE.to_string();
                state.session.server_url.clear();
                state.surface.reset();
            }
            (
                state.epoch,
                state.instance.take(),
                state.ready_task.take(),
            )
        };

        if let Some(task) = ready_task {
            task.abort();
        }
        if let Some(instance) = previous {
            self.teardown_instance(instance).await;
        }

        let result = match prepared {
            Ok((files, commands)) => {
                self.emit_status().await;
                self.add_log(LogType::System, BOOTING_MESSAGE.to_string())
                    .await;
                self.execute(epoch, files, commands).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            if let Some(task) = self.fail(epoch, e).await {
                task.abort();
            }
        }
    }

    /// Stop the session from any state: abort the readiness wait, tear down
    /// the sandbox and go back to idle. A no-op when already idle.
    pub async fn stop(&self) {
        let (instance, ready_task) = {
            let mut state = self.state.write().await;
            if state.session.status == RuntimeStatus::Idle && state.instance.is_none() {
                debug!("Stop ignored, session already idle");
                return;
            }

            state.epoch += 1;
            state.session = RuntimeSession::default();
            state.surface.reset();
            (state.instance.take(), state.ready_task.take())
        };

        if let Some(task) = ready_task {
            task.abort();
        }
        if let Some(instance) = instance {
            self.teardown_instance(instance).await;
        }

        info!("Project session stopped");
        self.emit_status().await;
        self.add_log(LogType::System, "Stopped".to_string()).await;
    }

    /// Get captured logs, optionally only those after `since` and only the
    /// most recent `limit` entries.
    pub async fn logs(
        &self,
        since: Option<chrono::DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Vec<RuntimeLog> {
        let logs = self.logs.read().await;
        let mut filtered: Vec<RuntimeLog> = match since {
            Some(since_time) => logs
                .iter()
                .filter(|log| log.timestamp > since_time)
                .cloned()
                .collect(),
            None => logs.iter().cloned().collect(),
        };

        if let Some(max_count) = limit {
            if filtered.len() > max_count {
                filtered = filtered.split_off(filtered.len() - max_count);
            }
        }

        filtered
    }

    pub async fn clear_logs(&self) {
        self.logs.write().await.clear();
        debug!("Cleared project runtime logs");
    }

    async fn execute(
        &self,
        epoch: u64,
        files: Vec<ProjectFile>,
        commands: ProjectCommands,
    ) -> PreviewResult<()> {
        let instance = self.sandbox.boot().await?;
        self.attach_instance(epoch, instance.clone()).await?;
        info!(
            "Writing {} files into sandbox {}",
            files.len(),
            instance.id()
        );

        for file in &files {
            self.ensure_current(epoch).await?;
            instance
                .mkdir(file.parent_dir(), MkdirOptions::recursive())
                .await?;
            instance.write_file(&file.path, &file.content).await?;
        }

        self.set_progress(epoch, INSTALLING_MESSAGE).await?;
        let install = instance
            .spawn(&self.config.shell, &shell_args(&commands.install_command))
            .await?;
        let ProcessHandle { output, exit } = install;
        self.forward_output(output);

        let exit_code = exit.wait().await;
        self.ensure_current(epoch).await?;
        let exit_code = exit_code?;
        if exit_code != 0 {
            return Err(PreviewError::InstallFailed {
                command: commands.install_command,
                exit_code,
            });
        }

        self.set_progress(epoch, STARTING_MESSAGE).await?;
        self.start_ready_task(epoch, instance.on_server_ready())
            .await?;

        let dev = instance
            .spawn(&self.config.shell, &shell_args(&commands.dev_command))
            .await?;
        self.watch_dev_server(dev, commands.dev_command);
        Ok(())
    }

    async fn attach_instance(
        &self,
        epoch: u64,
        instance: Arc<dyn SandboxInstance>,
    ) -> PreviewResult<()> {
        {
            let mut state = self.state.write().await;
            if state.epoch == epoch {
                state.instance = Some(instance);
                return Ok(());
            }
        }

        debug!("Run was stopped during boot, releasing sandbox {}", instance.id());
        self.teardown_instance(instance).await;
        Err(PreviewError::Detached)
    }

    async fn ensure_current(&self, epoch: u64) -> PreviewResult<()> {
        if self.state.read().await.epoch == epoch {
            Ok(())
        } else {
            Err(PreviewError::Detached)
        }
    }

    async fn set_progress(&self, epoch: u64, message: &str) -> PreviewResult<()> {
        {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                return Err(PreviewError::Detached);
            }
            state.session.message = message.to_string();
        }

        self.emit_status().await;
        self.add_log(LogType::System, message.to_string()).await;
        Ok(())
    }

    /// Spawn the readiness wait before the dev server starts so no
    /// notification is missed
    async fn start_ready_task(
        &self,
        epoch: u64,
        mut ready_rx: broadcast::Receiver<ServerReady>,
    ) -> PreviewResult<()> {
        let runtime = self.clone();
        let timeout = self.config.ready_timeout;

        let task = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, wait_for_ready(&mut ready_rx)).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(PreviewError::ReadyTimeout { timeout: limit }),
                    }
                }
                None => wait_for_ready(&mut ready_rx).await,
            };

            match outcome {
                Ok(ready) => runtime.mark_running(epoch, ready).await,
                Err(e) => {
                    runtime.fail(epoch, e).await;
                }
            }
        });

        let mut state = self.state.write().await;
        if state.epoch != epoch {
            task.abort();
            return Err(PreviewError::Detached);
        }
        state.ready_task = Some(task);
        Ok(())
    }

    async fn mark_running(&self, epoch: u64, ready: ServerReady) {
        let url = if ready.url.is_empty() {
            format!("http://localhost:{}", ready.port)
        } else {
            ready.url
        };

        {
            let mut state = self.state.write().await;
            if state.epoch != epoch || state.session.status != RuntimeStatus::Installing {
                debug!("Ignoring server-ready for {} from a stale run", url);
                return;
            }
            state.session.status = RuntimeStatus::Running;
            state.session.message.clear();
            state.session.server_url = url.clone();
            state.surface.navigate(&url);
            state.ready_task = None;
        }

        info!("Dev server ready at {}", url);
        self.emit_status().await;
        self.add_log(LogType::System, format!("Dev server ready at {}", url))
            .await;
    }

    /// Move the session to error. Returns the readiness task so a caller
    /// outside it can abort it.
    async fn fail(&self, epoch: u64, err: PreviewError) -> Option<JoinHandle<()>> {
        if matches!(err, PreviewError::Detached) {
            debug!("Stale run finished after stop");
            return None;
        }

        let ready_task = {
            let mut state = self.state.write().await;
            if state.epoch != epoch {
                debug!("Discarding error from a stale run: {}", err);
                return None;
            }
            state.session.status = RuntimeStatus::Error;
            state.session.message = err.to_string();
            state.session.server_url.clear();
            state.surface.reset();
            state.ready_task.take()
        };

        error!("Project run failed: {}", err);
        self.emit_status().await;
        self.add_log(LogType::System, err.to_string()).await;
        ready_task
    }

    async fn teardown_instance(&self, instance: Arc<dyn SandboxInstance>) {
        if let Err(e) = instance.teardown().await {
            warn!("Failed to tear down sandbox {}: {}", instance.id(), e);
        }
    }

    fn forward_output(&self, mut output: OutputStream) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            while let Some(chunk) = output.receiver.recv().await {
                let log_type = match chunk.stream {
                    StreamType::Stdout => LogType::Stdout,
                    StreamType::Stderr => LogType::Stderr,
                };
                runtime.add_log(log_type, chunk.data).await;
            }
        })
    }

    /// Capture dev server output and log its exit. Exiting does not change
    /// the session.
    fn watch_dev_server(&self, handle: ProcessHandle, command: String) {
        let ProcessHandle { output, exit } = handle;
        let forwarder = self.forward_output(output);
        let runtime = self.clone();

        tokio::spawn(async move {
            match exit.wait().await {
                Ok(code) => {
                    // Flush remaining output before the exit line
                    if let Err(e) = forwarder.await {
                        warn!("Dev server output forwarding ended abnormally: {}", e);
                    }
                    info!("Dev server '{}' exited with code {}", command, code);
                    runtime
                        .add_log(
                            LogType::System,
                            format!("{} exited with code {}", command, code),
                        )
                        .await;
                }
                Err(e) => debug!("Dev server exit unavailable: {}", e),
            }
        });
    }

    async fn add_log(&self, log_type: LogType, message: String) {
        let log = RuntimeLog {
            timestamp: Utc::now(),
            log_type,
            message,
        };

        {
            let mut logs = self.logs.write().await;
            logs.push_back(log.clone());
            while logs.len() > self.config.log_capacity {
                logs.pop_front();
            }
        }

        self.broadcast_event(RuntimeEvent::Log { log });
    }

    async fn emit_status(&self) {
        let session = self.session().await;
        self.broadcast_event(RuntimeEvent::Status { session });
    }

    fn broadcast_event(&self, event: RuntimeEvent) {
        if let Err(e) = self.event_tx.send(event) {
            // No subscribers is the normal case
            if self.event_tx.receiver_count() > 0 {
                warn!("Failed to broadcast runtime event: {}", e);
            }
        }
    }
}

/// Validate the fragment and resolve its commands before any sandbox work
fn prepare(
    fragment: &FragmentDescriptor,
    config: &PreviewConfig,
) -> PreviewResult<(Vec<ProjectFile>, ProjectCommands)> {
    let files = fragment.project_files().unwrap_or_default();
    if files.is_empty() {
        return Err(PreviewError::MissingProjectFiles);
    }
    if !files.iter().any(|file| file.path == "/package.json") {
        return Err(PreviewError::MissingPackageJson);
    }

    let commands = ProjectDetector::detect(
        fragment.template_id(),
        &files,
        fragment.install_command(),
        &config.default_install_command,
    );
    Ok((files, commands))
}

fn shell_args(command: &str) -> Vec<String> {
    vec!["-lc".to_string(), command.to_string()]
}

async fn wait_for_ready(
    ready_rx: &mut broadcast::Receiver<ServerReady>,
) -> PreviewResult<ServerReady> {
    loop {
        match ready_rx.recv().await {
            Ok(ready) => return Ok(ready),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} server-ready notifications", skipped);
            }
            Err(RecvError::Closed) => return Err(PreviewError::SandboxClosed),
        }
    }
}
