//! Fragments Preview - orchestrates how a generated fragment is previewed
//!
//! A fragment is routed by its template to one backend:
//!
//! - interpreted scripts run through a [`ScriptInterpreter`](fragments_sandbox::ScriptInterpreter)
//! - multi-file projects are booted in a sandbox by [`ProjectRuntime`], which writes
//!   the files, installs dependencies, starts a dev server and waits for it to listen
//! - results executed elsewhere are rendered by URL through [`ExternalPreview`]
//!
//! [`PreviewDispatcher`] owns the selection and keeps exactly one backend mounted.

pub mod detector;
pub mod dispatcher;
pub mod external;
pub mod fragment;
pub mod offline;
pub mod runtime;
pub mod script;
pub mod selector;
pub mod types;

// Re-export key types and functions for easier use
pub use detector::{Framework, PackageManager, ProjectCommands, ProjectDetector};
pub use dispatcher::{MountedPreview, PreviewDispatcher, PreviewServices};
pub use external::ExternalPreview;
pub use fragment::{
    ExecutionResult, FragmentCode, FragmentDescriptor, ProjectFile, RawFragmentFile, TemplateId,
};
pub use offline::generate_offline_fragment;
pub use runtime::ProjectRuntime;
pub use script::{ScriptPreview, ScriptState, ScriptStatus};
pub use selector::{select, select_template, BackendKind};
pub use types::{
    LogType, PreviewError, PreviewResult, RenderSurface, RuntimeEvent, RuntimeLog,
    RuntimeSession, RuntimeStatus, BLANK_TARGET, FRAME_PERMISSIONS,
};
