//! Record consumer
//!
//! `RecordSource` abstracts the consumer-group operations the worker needs:
//! subscribe, bounded poll, per-record commit and close. `KafkaRecordSource`
//! implements it on top of an rdkafka `StreamConsumer` with auto-commit
//! disabled, so offsets only move when the worker says so.

use crate::client::base_client_config;
use crate::error::StreamError;
use crate::record::ConsumedRecord;
use async_trait::async_trait;
use core_config::KafkaConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Consumer-group operations driven by the worker loop
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Join the group for `topics`. Errors are retried by the caller.
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError>;

    /// Wait up to `timeout` for the next record. `Ok(None)` when nothing arrived.
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>, StreamError>;

    /// Mark `record` and everything before it in its partition as processed.
    async fn commit(&self, record: &ConsumedRecord) -> Result<(), StreamError>;

    /// Leave the group. Called exactly once when the worker stops.
    async fn close(&self) -> Result<(), StreamError>;

    /// Source name for logging
    fn name(&self) -> &'static str;
}

/// rdkafka consumer with manual offset management
pub struct KafkaRecordSource {
    consumer: Arc<StreamConsumer>,
    group_id: String,
    probe_timeout: Duration,
}

impl KafkaRecordSource {
    /// Create the consumer. Does not contact the broker yet.
    pub fn new(config: &KafkaConfig) -> Result<Self, StreamError> {
        let consumer: StreamConsumer = base_client_config(config)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string())
            .create()
            .map_err(|e| StreamError::Config(format!("failed to create Kafka consumer: {e}")))?;

        Ok(Self {
            consumer: Arc::new(consumer),
            group_id: config.group_id.clone(),
            probe_timeout: Duration::from_millis(u64::from(config.session_timeout_ms)),
        })
    }
}

fn consume_error(err: KafkaError) -> StreamError {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => StreamError::Fatal(err.to_string()),
        _ => StreamError::Kafka(err),
    }
}

#[async_trait]
impl RecordSource for KafkaRecordSource {
    async fn subscribe(&self, topics: &[String]) -> Result<(), StreamError> {
        // librdkafka subscribes lazily; probe metadata so an unreachable
        // cluster surfaces here instead of as silent empty polls.
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.probe_timeout;
        tokio::task::spawn_blocking(move || consumer.fetch_metadata(None, timeout))
            .await
            .map_err(|e| StreamError::Internal(format!("metadata probe panicked: {e}")))?
            .map_err(|e| StreamError::Subscription {
                topics: topics.to_vec(),
                reason: e.to_string(),
            })?;

        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.consumer
            .subscribe(&topic_refs)
            .map_err(|e| StreamError::Subscription {
                topics: topics.to_vec(),
                reason: e.to_string(),
            })?;

        info!(group = %self.group_id, topics = ?topics, "Kafka consumer subscribed");
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumedRecord>, StreamError> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(message)) => Ok(Some(ConsumedRecord::from_message(&message))),
            Ok(Err(err)) => Err(consume_error(err)),
        }
    }

    async fn commit(&self, record: &ConsumedRecord) -> Result<(), StreamError> {
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset)?;
        self.consumer.commit_consumer_state(CommitMode::Async)?;

        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "Offset committed"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), StreamError> {
        let flushed = match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            Err(err) if err.rdkafka_error_code() == Some(RDKafkaErrorCode::NoOffset) => Ok(()),
            Err(err) => Err(StreamError::Kafka(err)),
        };
        self.consumer.unsubscribe();
        info!(group = %self.group_id, "Kafka consumer closed");
        flushed
    }

    fn name(&self) -> &'static str {
        "kafka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_consume_error_is_fatal() {
        let err = consume_error(KafkaError::MessageConsumption(RDKafkaErrorCode::Fatal));
        assert!(err.is_fatal());

        let err = consume_error(KafkaError::MessageConsumption(RDKafkaErrorCode::AllBrokersDown));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_consumer_creation_is_lazy() {
        // Creating the client never contacts the broker, but it does spawn on the runtime.
        let source = KafkaRecordSource::new(&KafkaConfig::new("localhost:1", "test-group")).unwrap();
        assert_eq!(source.name(), "kafka");
        assert_eq!(source.group_id, "test-group");
    }
}
