//! Recording sandbox fake shared by the preview integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

use fragments_preview::{
    FragmentCode, FragmentDescriptor, ProjectRuntime, RawFragmentFile, RuntimeSession,
    RuntimeStatus,
};
use fragments_sandbox::{
    ExitStatus, MkdirOptions, OutputChunk, OutputStream, ProcessHandle, SandboxError,
    SandboxInstance, SandboxResult, SandboxRuntime, ServerReady, StreamType,
};

/// Operations observed by the fake, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Boot,
    Mkdir(String),
    Write(String),
    Spawn(String),
    Teardown,
}

#[derive(Default)]
struct Shared {
    ops: Vec<Op>,
    /// Exit senders for install processes held open by the test
    held_installs: Vec<oneshot::Sender<i32>>,
    /// Exit senders for long-running processes
    running: Vec<oneshot::Sender<i32>>,
}

/// Sandbox runtime and instance in one. Every boot hands out a view over the
/// same recorder so tests can assert on the full call sequence.
#[derive(Clone)]
pub struct FakeSandbox {
    shared: Arc<Mutex<Shared>>,
    /// `None` keeps install processes running until [`FakeSandbox::finish_install`]
    install_exit: Option<i32>,
    /// Reason every boot fails with
    boot_failure: Option<String>,
    /// Path whose write fails
    write_failure: Option<String>,
    ready_tx: broadcast::Sender<ServerReady>,
}

impl FakeSandbox {
    pub fn new(install_exit: Option<i32>) -> Self {
        let (ready_tx, _) = broadcast::channel(16);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            install_exit,
            boot_failure: None,
            write_failure: None,
            ready_tx,
        }
    }

    /// Every boot fails with `reason`
    pub fn failing_boot(reason: &str) -> Self {
        Self {
            boot_failure: Some(reason.to_string()),
            ..Self::new(Some(0))
        }
    }

    /// Writing `path` fails; everything else behaves normally
    pub fn failing_write(path: &str) -> Self {
        Self {
            write_failure: Some(path.to_string()),
            ..Self::new(Some(0))
        }
    }

    pub fn ops(&self) -> Vec<Op> {
        self.shared.lock().unwrap().ops.clone()
    }

    pub fn spawned(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Spawn(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Op) -> usize {
        self.ops().iter().filter(|op| *op == wanted).count()
    }

    /// Resolve the oldest held install process with `code`
    pub fn finish_install(&self, code: i32) {
        let mut shared = self.shared.lock().unwrap();
        if !shared.held_installs.is_empty() {
            let sender = shared.held_installs.remove(0);
            let _ = sender.send(code);
        }
    }

    pub fn emit_ready(&self, port: u16, url: &str) {
        self.ready_tx
            .send(ServerReady {
                port,
                url: url.to_string(),
            })
            .expect("no readiness subscriber");
    }

    pub async fn wait_for_spawns(&self, count: usize) {
        let this = self;
        wait_until(move || async move { this.spawned().len() >= count }).await;
    }
}

#[async_trait]
impl SandboxRuntime for FakeSandbox {
    async fn boot(&self) -> SandboxResult<Arc<dyn SandboxInstance>> {
        self.shared.lock().unwrap().ops.push(Op::Boot);
        if let Some(reason) = &self.boot_failure {
            return Err(SandboxError::BootFailed(reason.clone()));
        }
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl SandboxInstance for FakeSandbox {
    fn id(&self) -> &str {
        "fake"
    }

    async fn mkdir(&self, path: &str, _options: MkdirOptions) -> SandboxResult<()> {
        self.shared
            .lock()
            .unwrap()
            .ops
            .push(Op::Mkdir(path.to_string()));
        Ok(())
    }

    async fn write_file(&self, path: &str, _content: &str) -> SandboxResult<()> {
        self.shared
            .lock()
            .unwrap()
            .ops
            .push(Op::Write(path.to_string()));
        if self.write_failure.as_deref() == Some(path) {
            return Err(SandboxError::Filesystem {
                path: path.to_string(),
                error: "disk quota exceeded".to_string(),
            });
        }
        Ok(())
    }

    async fn spawn(&self, _command: &str, args: &[String]) -> SandboxResult<ProcessHandle> {
        let command = args.last().cloned().unwrap_or_default();
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        let _ = output_tx.send(OutputChunk {
            timestamp: Utc::now(),
            stream: StreamType::Stdout,
            data: format!("> {}", command),
        });

        {
            let mut shared = self.shared.lock().unwrap();
            shared.ops.push(Op::Spawn(command.clone()));
            if command.contains("install") {
                match self.install_exit {
                    Some(code) => {
                        let _ = exit_tx.send(code);
                    }
                    None => shared.held_installs.push(exit_tx),
                }
            } else {
                shared.running.push(exit_tx);
            }
        }

        Ok(ProcessHandle {
            output: OutputStream {
                receiver: output_rx,
            },
            exit: ExitStatus::new(command, exit_rx),
        })
    }

    fn on_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready_tx.subscribe()
    }

    async fn teardown(&self) -> SandboxResult<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.ops.push(Op::Teardown);
        for sender in shared.running.drain(..) {
            let _ = sender.send(-1);
        }
        Ok(())
    }
}

/// Project fragment whose `code` lists `paths` in order
pub fn project_fragment(template: &str, paths: &[&str]) -> FragmentDescriptor {
    FragmentDescriptor {
        template: Some(template.to_string()),
        code: Some(FragmentCode::Files(
            paths
                .iter()
                .map(|path| {
                    Some(RawFragmentFile {
                        file_name: None,
                        file_path: Some(path.to_string()),
                        file_content: Some(if path.ends_with("package.json") {
                            r#"{"scripts":{"dev":"next dev"}}"#.to_string()
                        } else {
                            "export {}".to_string()
                        }),
                        file_finished: Some(true),
                    })
                })
                .collect(),
        )),
        ..Default::default()
    }
}

pub fn next_project() -> FragmentDescriptor {
    project_fragment(
        "nextjs-developer",
        &["package.json", "pages/index.tsx", "pages/api/hello.ts"],
    )
}

pub async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_status(runtime: &ProjectRuntime, status: RuntimeStatus) -> RuntimeSession {
    wait_until(move || async move { runtime.session().await.status == status }).await;
    runtime.session().await
}
