use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to open ledger at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unreadable legacy ledger {path}: {source}")]
    Serde {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("event {event_id} already recorded")]
    AlreadyRecorded { event_id: String },
    #[error("ledger path not configured")]
    MissingStore,
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
