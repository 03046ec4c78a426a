//! Registry client configuration.

use assetsync_registry::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;

/// Connection settings for the registry API.
#[derive(Clone, Serialize, Deserialize)]
pub struct RestRegistryConfig {
    /// API endpoint of the registry instance, e.g.
    /// `https://eurapi.example.com/instance/xmlmc`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    /// Whole-request timeout in seconds (default: 30).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Connect timeout in seconds (default: 10).
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_connection_timeout_secs() -> u64 {
    10
}

impl Default for RestRegistryConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            read_timeout_secs: default_read_timeout_secs(),
            connection_timeout_secs: default_connection_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for RestRegistryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestRegistryConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RestRegistryConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, read_secs: u64, connect_secs: u64) -> Self {
        self.read_timeout_secs = read_secs;
        self.connection_timeout_secs = connect_secs;
        self
    }

    pub fn validate(&self) -> RegistryResult<()> {
        if self.base_url.is_empty() {
            return Err(RegistryError::invalid_configuration("base_url is required"));
        }

        let url = url::Url::parse(&self.base_url).map_err(|e| {
            RegistryError::invalid_configuration(format!("invalid base_url: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RegistryError::invalid_configuration(format!(
                "unsupported base_url scheme: {}",
                url.scheme()
            )));
        }

        if self.api_key.trim().is_empty() {
            return Err(RegistryError::invalid_configuration("api_key is required"));
        }
        if self.read_timeout_secs == 0 {
            return Err(RegistryError::invalid_configuration(
                "read_timeout_secs must be greater than 0",
            ));
        }
        Ok(())
    }
}
