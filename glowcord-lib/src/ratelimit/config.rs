use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{ErrorKind, Result};

/// Default number of transport calls for one request before giving up
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default number of calls that may be in flight on one bucket
const DEFAULT_BUCKET_CONCURRENCY: usize = 1;

/// Wait used when a 429 carries no usable retry hint at all
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound for any single server-provided wait
const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60);

/// Rate limiting configuration of a [`crate::Dispatcher`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Maximum number of transport calls per request while the server
    /// keeps answering 429
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Number of calls allowed in flight on one bucket at a time
    #[serde(default = "default_bucket_concurrency")]
    pub bucket_concurrency: usize,

    /// Wait applied after a 429 without `Retry-After`, `retry_after` or
    /// `X-RateLimit-Reset-After`
    #[serde(default = "default_retry_after", with = "humantime_serde")]
    pub default_retry_after: Duration,

    /// Cap for server-provided waits
    #[serde(default = "default_max_retry_after", with = "humantime_serde")]
    pub max_retry_after: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            bucket_concurrency: default_bucket_concurrency(),
            default_retry_after: default_retry_after(),
            max_retry_after: default_max_retry_after(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_bucket_concurrency() -> usize {
    DEFAULT_BUCKET_CONCURRENCY
}

const fn default_retry_after() -> Duration {
    DEFAULT_RETRY_AFTER
}

const fn default_max_retry_after() -> Duration {
    DEFAULT_MAX_RETRY_AFTER
}

impl RateLimitConfig {
    /// Parse a configuration from TOML, using defaults for missing values
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if the TOML is malformed, has
    /// unknown keys, or sets `max_attempts` or `bucket_concurrency` to zero.
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)?;
        config.validate()
    }

    /// Load a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidConfig`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ErrorKind::InvalidConfig(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    fn validate(self) -> Result<Self> {
        if self.max_attempts == 0 {
            return Err(ErrorKind::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.bucket_concurrency == 0 {
            return Err(ErrorKind::InvalidConfig(
                "bucket_concurrency must be at least 1".into(),
            ));
        }
        Ok(self)
    }

    /// Clamp a server-provided wait to `max_retry_after`
    #[must_use]
    pub fn clamp(&self, wait: Duration) -> Duration {
        if wait > self.max_retry_after {
            log::warn!(
                "Server asked to wait {}s, capping at {}s",
                wait.as_secs_f64(),
                self.max_retry_after.as_secs_f64()
            );
            self.max_retry_after
        } else {
            wait
        }
    }
}
