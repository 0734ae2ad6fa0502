use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::types::PreviewError;

/// Known fragment templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateId {
    #[serde(rename = "code-interpreter-v1")]
    CodeInterpreterV1,
    #[serde(rename = "nextjs-developer")]
    NextjsDeveloper,
    #[serde(rename = "vue-developer")]
    VueDeveloper,
    #[serde(rename = "streamlit-developer")]
    StreamlitDeveloper,
    #[serde(rename = "gradio-developer")]
    GradioDeveloper,
}

impl TemplateId {
    pub const ALL: [TemplateId; 5] = [
        TemplateId::CodeInterpreterV1,
        TemplateId::NextjsDeveloper,
        TemplateId::VueDeveloper,
        TemplateId::StreamlitDeveloper,
        TemplateId::GradioDeveloper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::CodeInterpreterV1 => "code-interpreter-v1",
            TemplateId::NextjsDeveloper => "nextjs-developer",
            TemplateId::VueDeveloper => "vue-developer",
            TemplateId::StreamlitDeveloper => "streamlit-developer",
            TemplateId::GradioDeveloper => "gradio-developer",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateId {
    type Err = PreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateId::ALL
            .into_iter()
            .find(|template| template.as_str() == s)
            .ok_or_else(|| PreviewError::UnknownTemplate(s.to_string()))
    }
}

/// A file entry as produced by the generator. Every field may still be missing
/// while the fragment is streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFragmentFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_finished: Option<bool>,
}

/// Fragment code: a single source string or a list of (possibly null) file entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FragmentCode {
    Source(String),
    Files(Vec<Option<RawFragmentFile>>),
}

/// Possibly-partial description of what to run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_dependencies: Option<Vec<Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_additional_dependencies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dependencies_command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<FragmentCode>,
}

/// A validated project file with a sandbox-absolute path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub path: String,
    pub content: String,
    pub is_final: bool,
}

impl ProjectFile {
    pub fn new(path: &str, content: impl Into<String>) -> Self {
        Self {
            path: normalize_path(path),
            content: content.into(),
            is_final: true,
        }
    }

    /// Directory containing this file; `/` for files at the root
    pub fn parent_dir(&self) -> &str {
        match self.path.rfind('/') {
            Some(0) | None => "/",
            Some(index) => &self.path[..index],
        }
    }

    /// Final path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Force a single leading slash. No other sanitization happens here.
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

impl FragmentDescriptor {
    pub fn template_id(&self) -> Option<TemplateId> {
        self.template.as_deref().and_then(|t| t.parse().ok())
    }

    /// Multi-file project view of `code`.
    ///
    /// `None` when `code` is absent or a single source string. Null entries and
    /// entries without a path are dropped; missing content becomes empty.
    pub fn project_files(&self) -> Option<Vec<ProjectFile>> {
        match &self.code {
            Some(FragmentCode::Files(entries)) => Some(
                entries
                    .iter()
                    .flatten()
                    .filter_map(|entry| {
                        let path = entry.file_path.as_deref()?.trim();
                        if path.trim_start_matches('/').is_empty() {
                            return None;
                        }
                        Some(ProjectFile {
                            path: normalize_path(path),
                            content: entry.file_content.clone().unwrap_or_default(),
                            is_final: entry.file_finished.unwrap_or(false),
                        })
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Source text for single-file interpreted fragments
    pub fn script_source(&self) -> Option<&str> {
        match &self.code {
            Some(FragmentCode::Source(source)) => Some(source.as_str()),
            Some(FragmentCode::Files(entries)) => entries
                .iter()
                .flatten()
                .find_map(|entry| entry.file_content.as_deref()),
            None => None,
        }
    }

    /// Install command carried by the fragment, if any
    pub fn install_command(&self) -> Option<&str> {
        self.install_dependencies_command
            .as_deref()
            .map(str::trim)
            .filter(|command| !command.is_empty())
    }

    pub fn dependencies(&self) -> BTreeSet<String> {
        self.additional_dependencies
            .iter()
            .flatten()
            .flatten()
            .filter(|dep| !dep.is_empty())
            .cloned()
            .collect()
    }
}

/// Output already produced by an out-of-process executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub template: TemplateId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ExecutionResult {
    /// Results are never produced for the interpreted-script template
    pub fn new(template: TemplateId, url: Option<String>) -> Result<Self, PreviewError> {
        if template == TemplateId::CodeInterpreterV1 {
            return Err(PreviewError::UnsupportedResultTemplate(template.to_string()));
        }
        Ok(Self { template, url })
    }
}
