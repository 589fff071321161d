//! Delivery error types.

use thiserror::Error;

/// Delivery error type.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Non-2xx response. Displays as the status's textual reason.
    #[error("{reason}")]
    Status { status: u16, reason: String },

    /// Connection or protocol failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport gave up waiting
    #[error("Request timed out")]
    Timeout,

    /// Envelope could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Endpoint could not be built
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl DeliveryError {
    /// HTTP status carried by the error, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Result type alias using DeliveryError.
pub type DeliveryResult<T> = Result<T, DeliveryError>;
