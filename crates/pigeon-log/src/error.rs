//! Error types for the event log.

use rusqlite::ErrorCode;

use crate::record::RecordId;

/// Errors that can occur during event log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The backing store cannot be reached, is locked past its busy
    /// timeout, or has no free connection.
    #[error("event store unavailable: {0}")]
    StoreUnavailable(String),

    /// A caller-supplied parameter violates a documented constraint.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A stored record's payload could not be interpreted.
    #[error("malformed record {id}: {source}")]
    MalformedRecord {
        /// Id of the offending record.
        id: RecordId,
        /// Decoder failure.
        source: serde_json::Error,
    },

    /// A blocking tail read was cancelled before a record arrived.
    #[error("tail read cancelled")]
    Cancelled,

    /// A database operation failed for a reason other than availability.
    #[error("event log database error: {0}")]
    Database(rusqlite::Error),

    /// JSON serialization failed.
    #[error("event log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The database holds a table this build cannot use.
    #[error("event log schema error: {0}")]
    Schema(pigeon_db::SchemaError),

    /// A blocking storage task panicked or was aborted.
    #[error("event log task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LogError {
    /// Whether retrying the same call later could succeed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl From<pigeon_db::SchemaError> for LogError {
    fn from(err: pigeon_db::SchemaError) -> Self {
        match err {
            pigeon_db::SchemaError::Sqlite(e) => e.into(),
            other => Self::Schema(other),
        }
    }
}

impl From<rusqlite::Error> for LogError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull,
            ) => Self::StoreUnavailable(err.to_string()),
            _ => Self::Database(err),
        }
    }
}

impl From<r2d2::Error> for LogError {
    fn from(err: r2d2::Error) -> Self {
        Self::StoreUnavailable(err.to_string())
    }
}
