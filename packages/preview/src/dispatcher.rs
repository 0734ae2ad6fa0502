use std::sync::Arc;
use tracing::info;

use fragments_config::PreviewConfig;
use fragments_sandbox::{LocalSandboxRuntime, PythonInterpreter, SandboxRuntime, ScriptInterpreter};

use crate::external::ExternalPreview;
use crate::fragment::{ExecutionResult, FragmentDescriptor};
use crate::runtime::ProjectRuntime;
use crate::script::ScriptPreview;
use crate::selector::{select, BackendKind};

/// Capabilities handed to every backend a dispatcher mounts.
///
/// Resolved once per dispatcher and passed down explicitly.
#[derive(Clone)]
pub struct PreviewServices {
    pub sandbox: Arc<dyn SandboxRuntime>,
    pub interpreter: Arc<dyn ScriptInterpreter>,
    pub config: Arc<PreviewConfig>,
}

impl PreviewServices {
    pub fn new(
        sandbox: Arc<dyn SandboxRuntime>,
        interpreter: Arc<dyn ScriptInterpreter>,
        config: PreviewConfig,
    ) -> Self {
        Self {
            sandbox,
            interpreter,
            config: Arc::new(config),
        }
    }

    /// Host-backed services: temp-dir sandboxes and a local Python interpreter
    pub fn local(config: PreviewConfig) -> Self {
        Self::new(
            Arc::new(LocalSandboxRuntime::from_config(&config)),
            Arc::new(PythonInterpreter::from_config(&config)),
            config,
        )
    }
}

/// The backend view currently mounted by a dispatcher
pub enum MountedPreview {
    InterpretedScript(ScriptPreview),
    VirtualizedProject(ProjectRuntime),
    ExternalResult(ExternalPreview),
    None,
}

impl MountedPreview {
    pub fn kind(&self) -> BackendKind {
        match self {
            MountedPreview::InterpretedScript(_) => BackendKind::InterpretedScript,
            MountedPreview::VirtualizedProject(_) => BackendKind::VirtualizedProject,
            MountedPreview::ExternalResult(_) => BackendKind::ExternalResult,
            MountedPreview::None => BackendKind::None,
        }
    }

    /// Release whatever the view holds. A project runtime is stopped, which
    /// tears down its sandbox.
    pub async fn unmount(self) {
        match self {
            MountedPreview::InterpretedScript(script) => script.stop().await,
            MountedPreview::VirtualizedProject(runtime) => runtime.stop().await,
            MountedPreview::ExternalResult(_) | MountedPreview::None => {}
        }
    }
}

/// Mounts exactly one backend view for the current fragment
pub struct PreviewDispatcher {
    services: PreviewServices,
    mounted: MountedPreview,
}

impl PreviewDispatcher {
    pub fn new(services: PreviewServices) -> Self {
        Self {
            services,
            mounted: MountedPreview::None,
        }
    }

    pub fn services(&self) -> &PreviewServices {
        &self.services
    }

    pub fn kind(&self) -> BackendKind {
        self.mounted.kind()
    }

    pub fn mounted(&self) -> &MountedPreview {
        &self.mounted
    }

    /// Re-select the backend for a fragment update.
    ///
    /// The same kind keeps its view and receives the new data. A different kind
    /// unmounts the previous view before the new one is mounted.
    pub async fn update(
        &mut self,
        fragment: FragmentDescriptor,
        result: Option<ExecutionResult>,
    ) -> BackendKind {
        let kind = select(fragment.template.as_deref());

        if kind == self.mounted.kind() {
            match &mut self.mounted {
                MountedPreview::InterpretedScript(script) => script.set_fragment(fragment).await,
                MountedPreview::VirtualizedProject(runtime) => runtime.set_fragment(fragment).await,
                MountedPreview::ExternalResult(external) => external.set_result(result),
                MountedPreview::None => {}
            }
            return kind;
        }

        info!("Switching preview backend from {} to {}", self.mounted.kind(), kind);
        let previous = std::mem::replace(&mut self.mounted, MountedPreview::None);
        previous.unmount().await;

        self.mounted = match kind {
            BackendKind::InterpretedScript => MountedPreview::InterpretedScript(ScriptPreview::new(
                self.services.interpreter.clone(),
                fragment,
            )),
            BackendKind::VirtualizedProject => MountedPreview::VirtualizedProject(
                ProjectRuntime::new(
                    self.services.sandbox.clone(),
                    self.services.config.clone(),
                    fragment,
                ),
            ),
            BackendKind::ExternalResult => {
                MountedPreview::ExternalResult(ExternalPreview::new(result))
            }
            BackendKind::None => MountedPreview::None,
        };
        kind
    }

    /// Unmount the current view, leaving nothing mounted
    pub async fn unmount(&mut self) {
        let previous = std::mem::replace(&mut self.mounted, MountedPreview::None);
        previous.unmount().await;
    }
}
