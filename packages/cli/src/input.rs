use std::path::{Path, PathBuf};
use thiserror::Error;

use fragments_preview::{ExecutionResult, FragmentDescriptor, PreviewError};

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid execution result in {path}: {source}")]
    Result {
        path: PathBuf,
        #[source]
        source: PreviewError,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| InputError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a possibly-partial fragment descriptor from a JSON file
pub fn load_fragment(path: &Path) -> Result<FragmentDescriptor, InputError> {
    read_json(path)
}

/// Load an execution result, rejecting templates that never produce one
pub fn load_result(path: &Path) -> Result<ExecutionResult, InputError> {
    let raw: ExecutionResult = read_json(path)?;
    ExecutionResult::new(raw.template, raw.url).map_err(|source| InputError::Result {
        path: path.to_path_buf(),
        source,
    })
}
