use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the recovery tool
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Permission denied: {operation} {}", path.display())]
    PermissionDenied { path: PathBuf, operation: &'static str },

    #[error("I/O error while trying to {operation} {}: {source}", path.display())]
    TransientIo {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Destination unwritable: {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool failed to start: {0}")]
    PoolStartup(String),

    #[error("Source and destination are the same file: {}", path.display())]
    SameFile { path: PathBuf },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RecoveryError {
    /// Classify an I/O failure on a source path into the permission or transient bucket.
    pub fn from_io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            RecoveryError::PermissionDenied { path, operation }
        } else {
            RecoveryError::TransientIo {
                path,
                operation,
                source,
            }
        }
    }
}

/// Result type alias for recovery operations
pub type Result<T> = std::result::Result<T, RecoveryError>;
