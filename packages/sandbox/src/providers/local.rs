// ABOUTME: Local process-backed sandbox built on a temporary directory
// ABOUTME: Maps sandbox-absolute paths into the directory and runs commands with it as cwd

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use fragments_config::PreviewConfig;

use super::{
    ExitStatus, MkdirOptions, OutputChunk, OutputStream, ProcessHandle, SandboxInstance,
    SandboxRuntime, ServerReady, StreamType,
};
use crate::detect::detect_server_ready;
use crate::error::{SandboxError, SandboxResult};

const READY_CHANNEL_SIZE: usize = 16;
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(5);
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Boots [`LocalSandbox`] instances, each in its own temporary directory
#[derive(Debug, Clone, Default)]
pub struct LocalSandboxRuntime {
    root: Option<PathBuf>,
}

impl LocalSandboxRuntime {
    /// Instances are created under the system temp directory
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Instances are created under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            root: config.sandbox_root.clone(),
        }
    }
}

#[async_trait]
impl SandboxRuntime for LocalSandboxRuntime {
    async fn boot(&self) -> SandboxResult<Arc<dyn SandboxInstance>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fragment-");

        let dir = match &self.root {
            Some(root) => {
                tokio::fs::create_dir_all(root)
                    .await
                    .map_err(|e| SandboxError::BootFailed(e.to_string()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::BootFailed(e.to_string()))?;

        let sandbox = LocalSandbox::new(dir);
        info!(
            "Booted local sandbox {} at {}",
            sandbox.id,
            sandbox.root.display()
        );
        Ok(Arc::new(sandbox))
    }
}

/// A spawned command leading its own process group
struct TrackedProcess {
    pid: Option<u32>,
    kill: oneshot::Sender<()>,
}

/// Sandbox whose filesystem is a temporary directory on the host
pub struct LocalSandbox {
    id: String,
    root: PathBuf,
    dir: Mutex<Option<TempDir>>,
    ready_tx: broadcast::Sender<ServerReady>,
    processes: Mutex<Vec<TrackedProcess>>,
    torn_down: AtomicBool,
}

impl LocalSandbox {
    fn new(dir: TempDir) -> Self {
        let (ready_tx, _) = broadcast::channel(READY_CHANNEL_SIZE);
        Self {
            id: Uuid::new_v4().to_string(),
            root: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
            ready_tx,
            processes: Mutex::new(Vec::new()),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Host directory backing this sandbox
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_alive(&self) -> SandboxResult<()> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(SandboxError::TornDown(self.id.clone()));
        }
        Ok(())
    }

    /// Map a sandbox-absolute path onto the host directory
    fn resolve(&self, path: &str) -> SandboxResult<PathBuf> {
        let relative = path.trim_start_matches('/');
        let mut resolved = self.root.clone();

        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(SandboxError::InvalidPath {
                        path: path.to_string(),
                        reason: "parent directory components are not allowed".to_string(),
                    })
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::InvalidPath {
                        path: path.to_string(),
                        reason: "path must be relative to the sandbox root".to_string(),
                    })
                }
            }
        }

        Ok(resolved)
    }
}

/// Forward output lines to the process stream and report the first server announcement
async fn forward_lines<R>(
    reader: R,
    stream: StreamType,
    output_tx: mpsc::UnboundedSender<OutputChunk>,
    ready_tx: broadcast::Sender<ServerReady>,
    reported: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !reported.load(Ordering::SeqCst) {
            if let Some(ready) = detect_server_ready(&line) {
                if !reported.swap(true, Ordering::SeqCst) {
                    debug!("Detected server ready on port {}", ready.port);
                    // No subscribers is fine
                    let _ = ready_tx.send(ready);
                }
            }
        }

        // Keep draining after the receiver is gone so the pipe never fills up
        let _ = output_tx.send(OutputChunk {
            timestamp: Utc::now(),
            stream,
            data: line,
        });
    }
}

/// SIGTERM every process group, then SIGKILL whatever is left after the grace period
#[cfg(unix)]
async fn terminate_process_groups(pids: Vec<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use tokio::time::{sleep, Instant};

    let mut groups = Vec::new();
    for pid in pids {
        let pgid = Pid::from_raw(pid as i32);
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) => {
                debug!("Sent SIGTERM to process group {}", pid);
                groups.push(pgid);
            }
            // Group already gone
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to send SIGTERM to process group {}: {}", pid, e),
        }
    }

    let deadline = Instant::now() + KILL_GRACE_PERIOD;
    while !groups.is_empty() && Instant::now() < deadline {
        sleep(KILL_POLL_INTERVAL).await;
        groups.retain(|pgid| killpg(*pgid, None).is_ok());
    }

    for pgid in groups {
        warn!(
            "Process group {} did not respond to SIGTERM, sending SIGKILL",
            pgid
        );
        if let Err(e) = killpg(pgid, Signal::SIGKILL) {
            warn!("Failed to send SIGKILL to process group {}: {}", pgid, e);
        }
    }
}

#[async_trait]
impl SandboxInstance for LocalSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn mkdir(&self, path: &str, options: MkdirOptions) -> SandboxResult<()> {
        self.ensure_alive()?;
        let target = self.resolve(path)?;

        let result = if options.recursive {
            tokio::fs::create_dir_all(&target).await
        } else {
            tokio::fs::create_dir(&target).await
        };

        result.map_err(|e| SandboxError::Filesystem {
            path: path.to_string(),
            error: e.to_string(),
        })
    }

    async fn write_file(&self, path: &str, content: &str) -> SandboxResult<()> {
        self.ensure_alive()?;
        let target = self.resolve(path)?;

        tokio::fs::write(&target, content)
            .await
            .map_err(|e| SandboxError::Filesystem {
                path: path.to_string(),
                error: e.to_string(),
            })
    }

    async fn spawn(&self, command: &str, args: &[String]) -> SandboxResult<ProcessHandle> {
        self.ensure_alive()?;
        let command_line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so teardown reaches everything the command starts
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| SandboxError::ProcessSpawnError {
            command: command_line.clone(),
            error: e.to_string(),
        })?;
        let pid = child.id();

        info!(
            "Spawned '{}' in sandbox {} (pid {:?})",
            command_line, self.id, pid
        );

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let reported = Arc::new(AtomicBool::new(false));

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                stdout,
                StreamType::Stdout,
                output_tx.clone(),
                self.ready_tx.clone(),
                reported.clone(),
            ));
        }

        // Some servers announce themselves on stderr
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                StreamType::Stderr,
                output_tx,
                self.ready_tx.clone(),
                reported,
            ));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        self.processes.lock().await.push(TrackedProcess {
            pid,
            kill: kill_tx,
        });

        let sandbox_id = self.id.clone();
        let command_for_exit = command_line.clone();
        tokio::spawn(async move {
            let finished = tokio::select! {
                status = child.wait() => Some(status),
                _ = kill_rx => None,
            };

            let code = match finished {
                Some(Ok(status)) => status.code().unwrap_or(-1),
                Some(Err(e)) => {
                    warn!("Failed to wait for '{}': {}", command_for_exit, e);
                    -1
                }
                None => {
                    if let Err(e) = child.kill().await {
                        warn!(
                            "Failed to kill '{}' in sandbox {}: {}",
                            command_for_exit, sandbox_id, e
                        );
                    }
                    -1
                }
            };

            debug!("'{}' exited with code {}", command_for_exit, code);
            let _ = exit_tx.send(code);
        });

        Ok(ProcessHandle {
            output: OutputStream {
                receiver: output_rx,
            },
            exit: ExitStatus::new(command_line, exit_rx),
        })
    }

    fn on_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn teardown(&self) -> SandboxResult<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let processes: Vec<_> = self.processes.lock().await.drain(..).collect();
        info!(
            "Tearing down sandbox {} ({} process(es))",
            self.id,
            processes.len()
        );

        #[cfg(unix)]
        terminate_process_groups(processes.iter().filter_map(|p| p.pid).collect()).await;

        for process in processes {
            // Already-exited processes dropped their receiver
            let _ = process.kill.send(());
        }

        if let Some(dir) = self.dir.lock().await.take() {
            tokio::task::spawn_blocking(move || dir.close())
                .await
                .map_err(|e| SandboxError::Filesystem {
                    path: "/".to_string(),
                    error: e.to_string(),
                })??;
        }

        Ok(())
    }
}
