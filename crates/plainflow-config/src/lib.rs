//! Configuration, filesystem paths, and logging bootstrap for Plainflow.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    PlainflowConfig, RetrySettings, DEFAULT_API_HOST, DEFAULT_LOG_LEVEL,
    DEFAULT_LOOKUP_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::init_logging;
pub use paths::Paths;
