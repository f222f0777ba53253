//! Client construction parameters.

use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::retry::RetryPolicy;

pub const ENV_API_URL: &str = "ENSEK_API_URL";
pub const ENV_API_KEY: &str = "ENSEK_API_KEY";
pub const ENV_RETRY_COUNT: &str = "ENSEK_RETRY_COUNT";
pub const ENV_RETRY_WAIT_SECS: &str = "ENSEK_RETRY_WAIT_SECS";
pub const ENV_TIMEOUT_SECS: &str = "ENSEK_TIMEOUT_SECS";

/// Everything needed to build an `EnsekClient`.
///
/// The retry pair is stored as given and validated by `EnsekClient::new`.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub retry_count: u32,
    pub retry_wait: Duration,
    /// Per-request timeout; `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("retry_count", &self.retry_count)
            .field("retry_wait", &self.retry_wait)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            retry_count: 0,
            retry_wait: Duration::ZERO,
            timeout: None,
        }
    }

    pub fn with_retry(mut self, count: u32, wait: Duration) -> Self {
        self.retry_count = count;
        self.retry_wait = wait;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy> {
        RetryPolicy::new(self.retry_count, self.retry_wait)
    }

    /// Reads `ENSEK_API_URL` and `ENSEK_API_KEY` (required) plus the optional
    /// `ENSEK_RETRY_COUNT`, `ENSEK_RETRY_WAIT_SECS` and `ENSEK_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Config(format!("{name} is not set")))
        };
        let number = |name: &str| -> Result<Option<u64>> {
            match lookup(name) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|e| ApiError::Config(format!("{name}={raw:?}: {e}"))),
            }
        };

        let mut config = Self::new(required(ENV_API_URL)?, required(ENV_API_KEY)?);
        if let Some(count) = number(ENV_RETRY_COUNT)? {
            config.retry_count = u32::try_from(count)
                .map_err(|e| ApiError::Config(format!("{ENV_RETRY_COUNT}: {e}")))?;
        }
        if let Some(secs) = number(ENV_RETRY_WAIT_SECS)? {
            config.retry_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = number(ENV_TIMEOUT_SECS)? {
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }
}
