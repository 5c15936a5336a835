//! Kafka publishing for domain events

use crate::error::PublishError;
use crate::models::{DomainEvent, EventTopic, TopicSettings};
use kafka_worker::{DeliveryAck, RecordSink};
use std::sync::Arc;
use tracing::{debug, error, instrument};

/// Serializes domain events and hands them to a record sink.
///
/// Never touches the event store. Failures are returned, never dropped.
#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn RecordSink>,
    topics: TopicSettings,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn RecordSink>, topics: TopicSettings) -> Self {
        Self { sink, topics }
    }

    pub fn topics(&self) -> &TopicSettings {
        &self.topics
    }

    /// Publish `event` to `topic` under `key`. An empty key falls back to
    /// the event's partition key.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &DomainEvent,
    ) -> Result<DeliveryAck, PublishError> {
        if topic.trim().is_empty() {
            return Err(PublishError::InvalidTopic);
        }

        let key = if key.is_empty() {
            event.partition_key()
        } else {
            key.to_string()
        };
        let payload = serde_json::to_vec(event)?;

        match self.sink.send(topic, &key, &payload).await {
            Ok(ack) => {
                debug!(
                    topic = %ack.topic,
                    partition = ack.partition,
                    offset = ack.offset,
                    key = %key,
                    "Event published"
                );
                Ok(ack)
            }
            Err(source) => {
                error!(topic = %topic, key = %key, error = %source, "Failed to publish event");
                Err(PublishError::Delivery {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    /// Publish to the topic chosen by the event's entity references,
    /// keyed by its primary entity.
    pub async fn publish_event(&self, event: &DomainEvent) -> Result<DeliveryAck, PublishError> {
        let topic = self.topics.name(EventTopic::for_event(event)).to_string();
        self.publish(&topic, &event.partition_key(), event).await
    }
}
