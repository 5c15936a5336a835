//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the consumer worker.

use std::time::Duration;
use uuid::Uuid;

/// Configuration for the consumer worker
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Topics to subscribe to
    pub topics: Vec<String>,

    /// Unique consumer ID (auto-generated if not provided)
    pub consumer_id: String,

    /// Delay before the first subscription attempt
    pub startup_delay: Duration,

    /// Wait between failed subscription attempts
    pub subscribe_retry_interval: Duration,

    /// Upper bound of a single poll
    pub poll_timeout: Duration,

    /// Pause after a non-fatal consume error
    pub error_backoff: Duration,
}

impl WorkerConfig {
    /// Create a new WorkerConfig for the given topics
    pub fn new<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            consumer_id: format!("worker-{}", Uuid::new_v4()),
            startup_delay: Duration::from_secs(5),
            subscribe_retry_interval: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }

    /// Set the consumer ID
    pub fn with_consumer_id(mut self, id: impl Into<String>) -> Self {
        self.consumer_id = id.into();
        self
    }

    /// Set the startup delay
    pub fn with_startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }

    /// Set the wait between subscription attempts
    pub fn with_subscribe_retry_interval(mut self, interval: Duration) -> Self {
        self.subscribe_retry_interval = interval;
        self
    }

    /// Set the poll timeout
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the pause after a non-fatal consume error
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new(["port-events", "container-events"])
    }
}
