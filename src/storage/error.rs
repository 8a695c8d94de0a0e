//! Storage errors
//!
//! Probe and merge code never sees these: the executor logs them and moves
//! on, the rollup worker logs them per tick, the API maps them to 500.

use std::fmt;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug)]
pub enum StorageError {
    /// The store could not be opened
    ConnectionFailed(String),

    QueryFailed(String),

    /// Schema migrations under `migrations/` did not apply
    MigrationFailed(String),

    /// A stored config, run result or aggregated result is not valid JSON for its type
    SerializationError(String),

    /// A write references a configuration that does not exist
    NotFound(String),

    IoError(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed(msg) => write!(f, "failed to open store: {}", msg),
            StorageError::QueryFailed(msg) => write!(f, "store query failed: {}", msg),
            StorageError::MigrationFailed(msg) => write!(f, "schema migration failed: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "stored payload is invalid: {}", msg),
            StorageError::NotFound(what) => write!(f, "not found: {}", what),
            StorageError::IoError(err) => write!(f, "store I/O error: {}", err),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IoError(err)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::IoError(io_err),
            sqlx::Error::Database(db_err)
                if matches!(db_err.kind(), sqlx::error::ErrorKind::ForeignKeyViolation) =>
            {
                StorageError::NotFound(format!("referenced row ({})", db_err.message()))
            }
            sqlx::Error::ColumnDecode { index, source } => {
                StorageError::SerializationError(format!("column {}: {}", index, source))
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}
