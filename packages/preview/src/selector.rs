use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fragment::TemplateId;

/// Execution strategy for a fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Single-file source run by a script interpreter
    InterpretedScript,
    /// Multi-file project booted in a sandbox with a dev server
    VirtualizedProject,
    /// Result computed elsewhere and only rendered here
    ExternalResult,
    /// Nothing to render
    None,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::InterpretedScript => "interpreted-script",
            BackendKind::VirtualizedProject => "virtualized-project",
            BackendKind::ExternalResult => "external-result",
            BackendKind::None => "none",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a template identifier to its backend. Unknown or absent templates render nothing.
pub fn select(template: Option<&str>) -> BackendKind {
    match template.and_then(|t| t.parse::<TemplateId>().ok()) {
        Some(template) => select_template(template),
        None => BackendKind::None,
    }
}

pub fn select_template(template: TemplateId) -> BackendKind {
    match template {
        TemplateId::CodeInterpreterV1 => BackendKind::InterpretedScript,
        TemplateId::NextjsDeveloper | TemplateId::VueDeveloper => BackendKind::VirtualizedProject,
        TemplateId::StreamlitDeveloper | TemplateId::GradioDeveloper => {
            BackendKind::ExternalResult
        }
    }
}
