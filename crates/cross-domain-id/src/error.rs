//! Resolution error types.

use thiserror::Error;

/// Resolution error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No candidate domains are configured
    #[error("crossDomainId not enabled")]
    NotEnabled,

    /// Every lookup failed. Carries one failing response's reason.
    #[error("{0}")]
    Lookup(String),

    /// Lookup URL could not be built for a domain
    #[error("Invalid lookup domain {domain}: {reason}")]
    InvalidDomain { domain: String, reason: String },
}

/// Result type alias using ResolveError.
pub type ResolveResult<T> = Result<T, ResolveError>;
