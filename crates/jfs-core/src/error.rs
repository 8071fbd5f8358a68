/// Errors raised by a worker pool.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError {
    /// `min_threads > max_threads` or `max_threads < 1`.
    #[error("Invalid pool bounds: min_threads={min}, max_threads={max}")]
    InvalidBounds { min: usize, max: usize },

    /// The OS refused to create a worker thread.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The per-worker state (e.g. a database connection) could not be created.
    #[error("Failed to initialize worker: {0}")]
    WorkerInit(String),

    /// The pool no longer accepts work.
    #[error("Pool '{0}' is shutting down")]
    ShuttingDown(String),
}

/// Top-level errors surfaced to the filesystem and CLI boundaries.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum JfsError {
    /// Path, attribute, or row does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entry already exists.
    #[error("Already exists: {0}")]
    Exists(String),

    /// Database-layer failure.
    #[error("Database error: {0}")]
    Database(Box<dyn std::error::Error + Send + Sync>),

    /// Worker pool failure.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl From<jfs_config::ConfigError> for JfsError {
    fn from(e: jfs_config::ConfigError) -> Self {
        JfsError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_error_display() {
        let err = PoolError::InvalidBounds { min: 4, max: 2 };
        assert_eq!(
            err.to_string(),
            "Invalid pool bounds: min_threads=4, max_threads=2"
        );

        let err = PoolError::ShuttingDown("jfs-read".to_string());
        assert!(err.to_string().contains("jfs-read"));
    }

    #[test]
    fn test_jfs_from_pool_error() {
        let err: JfsError = PoolError::WorkerInit("no db".to_string()).into();
        assert!(matches!(err, JfsError::Pool(PoolError::WorkerInit(_))));
    }

    #[test]
    fn test_jfs_from_config_error() {
        let config_err = jfs_config::ConfigError::InvalidConfig("bad config".to_string());
        let err: JfsError = config_err.into();
        assert!(matches!(err, JfsError::Config(msg) if msg.contains("bad config")));
    }

    #[test]
    fn test_jfs_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: JfsError = io_err.into();
        assert!(matches!(err, JfsError::Io(_)));
    }
}
