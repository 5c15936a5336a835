//! Record producer
//!
//! `RecordSink` is the seam publishers depend on. `KafkaProducer` is the
//! librdkafka implementation and `RetryingSink` adds bounded retries for
//! transient delivery failures on top of any sink.
//!
//! # Example
//!
//! ```rust,ignore
//! use kafka_worker::{KafkaProducer, RecordSink, RetryPolicy, RetryingSink};
//!
//! let policy = RetryPolicy::from_config(&kafka_config);
//! let producer = RetryingSink::with_policy(KafkaProducer::new(&kafka_config)?, policy);
//! let ack = producer.send("port-events", "ship-7", &payload).await?;
//! ```

use crate::client::base_client_config;
use crate::error::{ErrorCategory, StreamError};
use crate::metrics::ProducerMetrics;
use async_trait::async_trait;
use core_config::KafkaConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{debug, warn};

/// Broker acknowledgement of a persisted record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAck {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// Anything that can durably append a keyed record to a topic
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append `payload` under `key`. Resolves once the broker acknowledged it.
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<DeliveryAck, StreamError>;

    /// Sink name for logging
    fn name(&self) -> &'static str;
}

/// librdkafka producer with idempotent, all-replica acknowledgements.
pub struct KafkaProducer {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaProducer {
    /// Create a producer from the shared Kafka settings.
    pub fn new(config: &KafkaConfig) -> Result<Self, StreamError> {
        let producer: FutureProducer = base_client_config(config)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("max.in.flight.requests.per.connection", "5")
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .map_err(|e| StreamError::Config(format!("failed to create Kafka producer: {e}")))?;

        Ok(Self {
            producer,
            timeout: Duration::from_millis(u64::from(config.message_timeout_ms)),
        })
    }
}

#[async_trait]
impl RecordSink for KafkaProducer {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<DeliveryAck, StreamError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(err, _message)| StreamError::Kafka(err))?;

        Ok(DeliveryAck {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded retry schedule for transient send failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// Default schedule with the retry count from `KAFKA_PUBLISH_MAX_RETRIES`
    pub fn from_config(config: &KafkaConfig) -> Self {
        Self::new(config.publish_max_retries, DEFAULT_BASE_DELAY)
    }

    /// Delay before retry number `attempt` (0-based), doubling and capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

/// Wraps a sink with retries on transient errors.
pub struct RetryingSink<S> {
    inner: S,
    policy: RetryPolicy,
    metrics: ProducerMetrics,
}

impl<S: RecordSink> RetryingSink<S> {
    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            metrics: ProducerMetrics,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: RecordSink> RecordSink for RetryingSink<S> {
    async fn send(&self, topic: &str, key: &str, payload: &[u8]) -> Result<DeliveryAck, StreamError> {
        let mut attempt = 0;
        loop {
            match self.inner.send(topic, key, payload).await {
                Ok(ack) => {
                    debug!(
                        topic = %ack.topic,
                        partition = ack.partition,
                        offset = ack.offset,
                        retries = attempt,
                        "Record delivered"
                    );
                    self.metrics.delivered(topic);
                    return Ok(ack);
                }
                Err(err) if err.category() == ErrorCategory::Transient && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        topic = %topic,
                        key = %key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient delivery failure, retrying"
                    );
                    self.metrics.retried(topic);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.metrics.failed(topic);
                    return Err(err);
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    fn ack() -> DeliveryAck {
        DeliveryAck {
            topic: "port-events".to_string(),
            partition: 0,
            offset: 7,
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_count_from_config() {
        let mut config = KafkaConfig::new("localhost:9092", "g");
        config.publish_max_retries = 0;
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let mut mock = MockRecordSink::new();
        let mut seq = Sequence::new();
        mock.expect_send()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StreamError::Unavailable("broker down".into())));
        mock.expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(ack()));

        let sink = RetryingSink::with_policy(mock, fast_policy());
        let result = sink.send("port-events", "ship-7", b"{}").await.unwrap();
        assert_eq!(result.offset, 7);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let mut mock = MockRecordSink::new();
        mock.expect_send()
            .times(4)
            .returning(|_, _, _| Err(StreamError::Unavailable("broker down".into())));

        let sink = RetryingSink::with_policy(mock, fast_policy());
        let err = sink.send("port-events", "k", b"{}").await.unwrap_err();
        assert!(matches!(err, StreamError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut mock = MockRecordSink::new();
        mock.expect_send()
            .times(1)
            .returning(|_, _, _| Err(StreamError::permanent("record too large")));

        let sink = RetryingSink::with_policy(mock, fast_policy());
        assert!(sink.send("port-events", "k", b"{}").await.is_err());
    }
}
