//! Dispatch queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of requests a queue runs at once unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 4;

/// What happens when a dispatched request runs too long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    /// No limit, the transport decides.
    #[default]
    None,
    /// Abort the transport call and deliver a timeout error.
    Cancel(#[serde(with = "humantime_serde")] Duration),
    /// Log a warning once the call completes late, deliver normally.
    Warn(#[serde(with = "humantime_serde")] Duration),
}

/// Configuration for a [`RequestQueue`](crate::RequestQueue).
///
/// Loadable from YAML or any other serde format; durations use humantime
/// notation (`250ms`, `30s`).
///
/// ```
/// use std::time::Duration;
/// use courier::{QueueConfig, TimeoutPolicy};
///
/// let config = QueueConfig::builder()
///     .max_concurrent_requests(8)
///     .timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(config.request_timeout, TimeoutPolicy::Cancel(Duration::from_secs(10)));
/// assert!(config.deduplicate);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on requests in flight. `None` means unbounded.
    pub max_concurrent_requests: Option<usize>,
    /// Per-request timeout policy.
    pub request_timeout: TimeoutPolicy,
    /// Longest a synchronous caller waits for delivery. `None` waits forever.
    #[serde(with = "humantime_serde")]
    pub sync_wait_timeout: Option<Duration>,
    /// Share one transport call between equal envelopes in flight.
    pub deduplicate: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: Some(DEFAULT_MAX_CONCURRENT_REQUESTS),
            request_timeout: TimeoutPolicy::None,
            sync_wait_timeout: None,
            deduplicate: true,
        }
    }
}

impl QueueConfig {
    /// Create a new builder for QueueConfig.
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }
}

/// Builder for [`QueueConfig`].
#[derive(Debug, Clone, Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Set maximum concurrent requests.
    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.config.max_concurrent_requests = Some(max);
        self
    }

    /// Remove the concurrency bound.
    pub fn unbounded(mut self) -> Self {
        self.config.max_concurrent_requests = None;
        self
    }

    /// Set timeout policy.
    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.config.request_timeout = policy;
        self
    }

    /// Set timeout with cancel policy.
    pub fn timeout(self, duration: Duration) -> Self {
        self.timeout_policy(TimeoutPolicy::Cancel(duration))
    }

    /// Bound the wait of synchronous callers.
    pub fn sync_wait_timeout(mut self, duration: Duration) -> Self {
        self.config.sync_wait_timeout = Some(duration);
        self
    }

    /// Enable or disable in-flight deduplication.
    pub fn deduplicate(mut self, enabled: bool) -> Self {
        self.config.deduplicate = enabled;
        self
    }

    /// Build the QueueConfig.
    pub fn build(self) -> QueueConfig {
        self.config
    }
}
