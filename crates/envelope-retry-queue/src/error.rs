//! Queue error types.

use plainflow_storage::StorageError;
use thiserror::Error;

/// Queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Persistent store failed
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Persisted sequence could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A storage task on the blocking pool panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// An inline drain was requested while the drain task is running
    #[error("Queue {0} is already draining")]
    AlreadyRunning(String),
}

/// Result type alias using QueueError.
pub type QueueResult<T> = Result<T, QueueError>;

/// Terminal failure reported through the `processed` notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessedError {
    /// The entry was dropped after too many failed attempts
    #[error("Max attempts exceeded after {attempts} attempts: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: String },
}
