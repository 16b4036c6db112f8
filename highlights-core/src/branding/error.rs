use std::path::PathBuf;

use thiserror::Error;

use super::BrandingStage;
use crate::tools::ToolError;

#[derive(Debug, Error)]
pub enum BrandingError {
    #[error("branding asset missing: {path}")]
    MissingAsset { path: PathBuf },
    #[error("{stage} stage failed: {source}")]
    Tool {
        stage: BrandingStage,
        #[source]
        source: ToolError,
    },
    #[error("{stage} stage produced no output at {path}")]
    MissingOutput { stage: BrandingStage, path: PathBuf },
    #[error("failed to probe {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("probe of {path} failed: {source}")]
    ProbeTool {
        path: PathBuf,
        #[source]
        source: ToolError,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BrandingError {
    pub fn is_fatal(&self) -> bool {
        match self {
            BrandingError::MissingAsset { .. } => true,
            BrandingError::Tool { source, .. } | BrandingError::ProbeTool { source, .. } => {
                matches!(source, ToolError::NotFound { .. })
            }
            _ => false,
        }
    }
}

pub type BrandingResult<T> = std::result::Result<T, BrandingError>;
