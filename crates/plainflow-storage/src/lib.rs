//! Key/value persistence for the Plainflow SDK.
//!
//! Two backends implement [`KeyValueStorage`]:
//! - [`CookieStorage`]: a cookie-like jar with per-value max-age, used for
//!   pages served over http(s)
//! - [`LocalStorage`]: a file-backed store, used for `file:` and extension
//!   schemes where cookies are unreliable
//!
//! The core only ever sees the trait.

mod cookie;
mod keys;
mod local;
mod traits;

pub use cookie::{CookieOptions, CookieStorage};
pub use keys::StorageKeys;
pub use local::LocalStorage;
pub use traits::{read_json, write_json, KeyValueStorage};

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Stored value could not be encoded or decoded
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Which backend suits a page origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Cookie,
    Local,
}

impl StorageKind {
    /// Cookies for network-addressable schemes, local storage otherwise.
    ///
    /// Accepts the scheme with or without a trailing colon (`"file:"`).
    pub fn for_scheme(scheme: &str) -> Self {
        match scheme.trim_end_matches(':').to_ascii_lowercase().as_str() {
            "http" | "https" => StorageKind::Cookie,
            _ => StorageKind::Local,
        }
    }
}

/// Open the backend suited to `scheme`. `local_path` backs the local store.
pub fn storage_for_scheme(
    scheme: &str,
    local_path: &Path,
) -> StorageResult<Arc<dyn KeyValueStorage>> {
    match StorageKind::for_scheme(scheme) {
        StorageKind::Cookie => Ok(Arc::new(CookieStorage::new())),
        StorageKind::Local => Ok(Arc::new(LocalStorage::open(local_path)?)),
    }
}
