// ABOUTME: Sandbox capabilities consumed by the fragment preview orchestrator
// ABOUTME: Capability traits, a local process-backed sandbox and a script interpreter

pub mod detect;
pub mod error;
pub mod interpreter;
pub mod providers;

pub use detect::{detect_server_ready, extract_port_from_log};
pub use error::{SandboxError, SandboxResult};
pub use interpreter::{PythonInterpreter, ScriptInterpreter, ScriptOutput};
pub use providers::{
    ExitStatus, LocalSandbox, LocalSandboxRuntime, MkdirOptions, OutputChunk, OutputStream,
    ProcessHandle, SandboxInstance, SandboxRuntime, ServerReady, StreamType,
};
