use std::path::PathBuf;

use jfs_core::{JfsError, PoolError};

/// Errors raised by database operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DbError {
    /// The query matched no row.
    #[error("No matching row")]
    NotFound,

    /// A UNIQUE or PRIMARY KEY constraint rejected the statement.
    #[error("Constraint violation: {message}")]
    Constraint { message: String },

    /// Any other SQLite failure, with the statement that caused it.
    #[error("Query failed: {source} [{sql}]")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to open database {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A path could not be represented as UTF-8 query text.
    #[error("Path is not valid UTF-8: {0}")]
    Encoding(String),

    /// The operation was dropped unexecuted because its pool shut down.
    #[error("Operation discarded before execution")]
    Discarded,

    /// The operation completed with a payload of a different shape.
    #[error("Unexpected result: expected {expected}, got {actual}")]
    UnexpectedOutput {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
}

impl From<DbError> for JfsError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => JfsError::NotFound("no matching row".to_string()),
            DbError::Constraint { message } => JfsError::Exists(message),
            DbError::Pool(e) => JfsError::Pool(e),
            other => JfsError::Database(Box::new(other)),
        }
    }
}
