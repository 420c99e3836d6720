//! Store error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the run store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No checkpoint at cycle {cycle} for run {run_id}")]
    CheckpointMissing { run_id: String, cycle: u64 },

    #[error("Run store already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Run store not found: {0}")]
    NotFound(PathBuf),
}
