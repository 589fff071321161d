//! SDK configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Collection host used when `apiHost` is not set.
pub const DEFAULT_API_HOST: &str = "pipe.plainflow.net/v1";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default transport timeout for a single delivery.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default timeout for one cross-domain identity lookup.
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 5;

/// Backoff and abandonment settings for the retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    /// Delay before the first retry.
    pub min_retry_delay_ms: u64,
    /// Cap for the exponential delay.
    pub max_retry_delay_ms: u64,
    /// Attempts after which an entry is abandoned.
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            min_retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
            max_attempts: 10,
        }
    }
}

impl RetrySettings {
    pub fn min_retry_delay(&self) -> Duration {
        Duration::from_millis(self.min_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

/// Configuration recognized by the SDK core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainflowConfig {
    /// Write key identifying the destination.
    #[serde(default)]
    pub api_key: String,
    /// Collection host override, e.g. `api.example.com`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_host: Option<String>,
    /// Queue envelopes durably instead of sending immediately.
    #[serde(default = "default_true")]
    pub retry_queue: bool,
    #[serde(default)]
    pub add_bundled_metadata: bool,
    #[serde(default)]
    pub unbundled_integrations: Vec<String>,
    /// Ordered candidate domains for cross-domain identity lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_domain_id_servers: Option<Vec<String>>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_lookup_timeout_secs")]
    pub lookup_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_lookup_timeout_secs() -> u64 {
    DEFAULT_LOOKUP_TIMEOUT_SECS
}

impl Default for PlainflowConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_host: None,
            retry_queue: true,
            add_bundled_metadata: false,
            unbundled_integrations: Vec::new(),
            cross_domain_id_servers: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            retry: RetrySettings::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            lookup_timeout_secs: DEFAULT_LOOKUP_TIMEOUT_SECS,
        }
    }
}

impl PlainflowConfig {
    /// Defaults with the given write key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Load from `~/.plainflow/config.json` (if present), then apply
    /// `PLAINFLOW_*` environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            debug!(path = %config_path.display(), "Loading config file");
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlainflowConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// [`PlainflowConfig::load`]). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(api_key) = non_empty("PLAINFLOW_API_KEY") {
            self.api_key = api_key;
        }
        if let Some(api_host) = non_empty("PLAINFLOW_API_HOST") {
            self.api_host = Some(api_host);
        }
        if let Some(log_level) = non_empty("PLAINFLOW_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Check the fields the core cannot run without.
    pub fn validate(&self) -> CoreResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("apiKey is required".to_string()));
        }
        if let Some(host) = &self.api_host {
            self.collection_base_url_for(host)?;
        }
        if self.retry.min_retry_delay_ms > self.retry.max_retry_delay_ms {
            return Err(CoreError::Config(
                "retry.minRetryDelayMs must not exceed retry.maxRetryDelayMs".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL for deliveries, always over https.
    pub fn collection_base_url(&self) -> CoreResult<Url> {
        let host = self.api_host.as_deref().unwrap_or(DEFAULT_API_HOST);
        self.collection_base_url_for(host)
    }

    fn collection_base_url_for(&self, host: &str) -> CoreResult<Url> {
        let bare = host
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(host)
            .trim_end_matches('/');
        if bare.is_empty() {
            return Err(CoreError::Config("apiHost must not be empty".to_string()));
        }
        Url::parse(&format!("https://{bare}")).map_err(CoreError::from)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }
}
