//! Consumed record wrapper
//!
//! An owned copy of a Kafka message with its position (topic, partition, offset).

use chrono::{DateTime, Utc};
use rdkafka::message::{BorrowedMessage, Message};

/// A record read from a topic, detached from the client buffer
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub payload: Option<Vec<u8>>,
    /// Broker or producer timestamp, when the message carries one
    pub timestamp: Option<DateTime<Utc>>,
}

impl ConsumedRecord {
    /// Copy a borrowed rdkafka message
    pub fn from_message(message: &BorrowedMessage<'_>) -> Self {
        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec),
            timestamp: message
                .timestamp()
                .to_millis()
                .and_then(DateTime::from_timestamp_millis),
        }
    }

    /// Key as UTF-8, if present and valid
    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref().and_then(|k| std::str::from_utf8(k).ok())
    }

    /// Position metadata handed to event handlers
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            topic: self.topic.clone(),
            partition: self.partition,
            offset: self.offset,
            key: self.key_str().map(str::to_string),
            timestamp: self.timestamp,
        }
    }
}

/// Where a record came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecordMeta {
    /// How long ago the record was produced
    pub fn age_ms(&self) -> Option<i64> {
        self.timestamp
            .map(|ts| (Utc::now() - ts).num_milliseconds())
    }
}
