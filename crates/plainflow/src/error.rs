//! SDK error types.

use thiserror::Error;

/// SDK error type.
#[derive(Error, Debug)]
pub enum PlainflowError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] plainflow_config::CoreError),

    /// Persistent store failed
    #[error("Storage error: {0}")]
    Storage(#[from] plainflow_storage::StorageError),

    /// Immediate delivery failed
    #[error("Delivery error: {0}")]
    Delivery(#[from] delivery_client::DeliveryError),

    /// Retry queue failed
    #[error("Queue error: {0}")]
    Queue(#[from] envelope_retry_queue::QueueError),

    /// Cross-domain identity resolution failed
    #[error("{0}")]
    Resolve(#[from] cross_domain_id::ResolveError),
}

/// Result type alias using PlainflowError.
pub type PlainflowResult<T> = Result<T, PlainflowError>;
