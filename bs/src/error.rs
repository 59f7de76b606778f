//! Error types for the sync pipeline
//!
//! `ConfigError` and `SourceError` are fatal and surface through
//! [`SyncError`]. `TransformError` and `WriteError` are per-record and
//! per-batch failures that end up in the `SyncReport` instead.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Invalid synchronizer setup, detected before anything runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Batch size must be at least 1, got {0}")]
    InvalidBatchSize(usize),

    #[error("Conflict key must name at least one column")]
    EmptyConflictKey,

    #[error("Conflict key column {0} appears more than once")]
    DuplicateKeyColumn(String),

    #[error("Destination column {0} is mapped more than once")]
    DuplicateColumn(String),

    #[error("Destination table name is empty")]
    EmptyTable,

    #[error("Write attempts must be at least 1")]
    InvalidWriteAttempts,

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),
}

/// Failure to obtain source data
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source database not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to open source {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Source query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Invalid source query: {0}")]
    InvalidQuery(String),
}

/// A single record could not be mapped; the record is skipped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field {field} ({found}) cannot be converted to {target}")]
    Conversion {
        field: String,
        found: String,
        target: &'static str,
    },

    #[error("Conflict key column {0} is missing or empty")]
    MissingKey(String),

    #[error("{0}")]
    Rejected(String),
}

/// A batch could not be committed to the destination
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to connect to destination: {0}")]
    Connect(String),

    #[error("Destination rejected batch ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WriteError {
    /// Check if another attempt at the same batch could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            WriteError::Rejected { status, .. } => *status >= 500 || *status == 429,
            WriteError::Network(_) => true,
            WriteError::Timeout(_) => true,
            WriteError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            WriteError::Connect(_) | WriteError::Database(_) | WriteError::InvalidBatch(_) | WriteError::Json(_) => {
                false
            }
        }
    }
}

/// Fatal errors returned by `BatchSynchronizer::run`
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Source read error: {0}")]
    SourceRead(#[from] SourceError),
}
