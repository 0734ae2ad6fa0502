use crate::fragment::ExecutionResult;
use crate::types::RenderSurface;

/// Renders a result produced by an out-of-process executor. There is no
/// lifecycle: the surface simply follows the result's URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalPreview {
    result: Option<ExecutionResult>,
}

impl ExternalPreview {
    pub fn new(result: Option<ExecutionResult>) -> Self {
        Self { result }
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Option<ExecutionResult>) {
        self.result = result;
    }

    /// Surface pointed at the result URL; `None` when there is nothing to render
    pub fn surface(&self) -> Option<RenderSurface> {
        self.result
            .as_ref()
            .and_then(|result| result.url.as_deref())
            .filter(|url| !url.is_empty())
            .map(RenderSurface::at)
    }
}
