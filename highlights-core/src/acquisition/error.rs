use std::path::PathBuf;

use thiserror::Error;

use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("downloader error: {0}")]
    Tool(#[from] ToolError),
    #[error("download reported success but {path} is missing or empty")]
    MissingOutput { path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl AcquisitionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AcquisitionError::Tool(ToolError::NotFound { .. }))
    }
}

pub type AcquisitionResult<T> = std::result::Result<T, AcquisitionError>;
