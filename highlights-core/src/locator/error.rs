use thiserror::Error;

use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum LocatorError {
    #[error("search tool error: {0}")]
    Tool(#[from] ToolError),
    #[error("unreadable search results for \"{query}\": {source}")]
    Parse {
        query: String,
        #[source]
        source: serde_json::Error,
    },
}

impl LocatorError {
    /// A missing search binary will fail every variant the same way.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LocatorError::Tool(ToolError::NotFound { .. }))
    }
}

pub type LocatorResult<T> = std::result::Result<T, LocatorError>;
