//! Error taxonomy shared by the storage crates

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by config loading, locking, the metadata index and the shadow store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// A config field was unusable and has been replaced by a default or a clamped value.
    #[error("config field `{field}`: {message}")]
    Config { field: String, message: String },

    /// A malformed exclusion pattern; the pattern is skipped.
    #[error("invalid exclusion pattern `{pattern}`: {message}")]
    Exclusion { pattern: String, message: String },

    /// Lock wait exceeded its bound.
    #[error("timed out after {waited:?} waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    /// A storage-engine invocation exceeded its execution timeout.
    #[error("storage command `{command}` timed out after {timeout:?}")]
    StorageTimeout { command: String, timeout: Duration },

    /// A storage-engine invocation exited unsuccessfully.
    #[error("storage command `{command}` failed ({status}): {stderr}")]
    StorageCommand {
        command: String,
        status: String,
        stderr: String,
    },

    /// The metadata document could not be parsed.
    #[error("metadata document {} is unreadable{}", path.display(), backup.as_ref().map(|b| format!("; preserved as {}", b.display())).unwrap_or_default())]
    MetadataCorruption {
        path: PathBuf,
        backup: Option<PathBuf>,
    },

    /// Writing the metadata document would exceed its size cap.
    #[error("metadata document would grow to {size} bytes, over the {limit} byte cap")]
    CapacityExceeded { size: u64, limit: u64 },

    /// A path escaping the project or otherwise unusable.
    #[error("rejected path `{path}`: {reason}")]
    PathValidation { path: String, reason: String },

    #[error("unknown checkpoint `{0}`")]
    UnknownCheckpoint(String),

    #[error("ambiguous checkpoint prefix `{prefix}`: matches {count} checkpoints")]
    AmbiguousCheckpoint { prefix: String, count: usize },

    #[error("checkpoint {0} is already recorded")]
    DuplicateCheckpoint(String),

    /// Status change outside pending→completed / pending→failed.
    #[error("checkpoint {id} is {from}; cannot move to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CheckpointError {
    /// Whether the caller may retry the same operation and expect it to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::StorageTimeout { .. })
    }

    pub fn path_validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PathValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CheckpointError>;
