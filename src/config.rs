//! Configuration types for pagewise

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool settings for a dedicated [`Scheduler`](crate::Scheduler)
///
/// The scheduler runs remote calls and delivers `on_complete` callbacks.
/// A single worker is enough for most clients; callbacks are delivered
/// off the registering thread either way.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads (default: 1)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Name given to worker threads (default: "task-worker")
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            thread_name: default_thread_name(),
        }
    }
}

/// Retry configuration for transient transport failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// A configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }
}

/// Configuration for [`Client`](crate::Client) and its default HTTP transport
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL every endpoint is appended to (e.g. "https://api.example.com")
    pub base_url: String,

    /// API key sent with every request (None = no key header)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Header carrying the API key (default: "x-api-key")
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Page size used by paginated listings (default: 50)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Worker pool for the client's scheduler
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl ClientConfig {
    /// Creates a configuration for `base_url` with every other setting at its default
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            api_key_header: default_api_key_header(),
            request_timeout: default_request_timeout(),
            page_size: default_page_size(),
            retry: RetryConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }

    /// Checks the configuration for values that cannot work
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| Error::config("base_url", format!("invalid base URL: {e}")))?;

        if self.page_size == 0 {
            return Err(Error::config("page_size", "page size must be positive"));
        }
        if self.scheduler.worker_threads == 0 {
            return Err(Error::config(
                "scheduler.worker_threads",
                "at least one worker thread is required",
            ));
        }
        if self.api_key_header.trim().is_empty() {
            return Err(Error::config(
                "api_key_header",
                "API key header name must not be empty",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

fn default_worker_threads() -> usize {
    1
}

fn default_thread_name() -> String {
    "task-worker".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

pub(crate) fn default_page_size() -> usize {
    50
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
