//! Errors shared by the producer, the consumer and the worker loop.
//!
//! Every error maps to an [`ErrorCategory`]. Producers retry `Transient`
//! sends, the worker backs off on `Transient` polls and stops on `Fatal`.

use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use thiserror::Error;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Broker hiccup or timeout; worth another attempt
    Transient,
    /// Retrying cannot help
    Permanent,
    /// The client instance is unusable
    Fatal,
}

/// Kafka stream errors shared by producer, consumer and worker
#[derive(Error, Debug)]
pub enum StreamError {
    /// librdkafka client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record processing failed
    #[error("Processing error: {message}")]
    Processing {
        message: String,
        category: ErrorCategory,
    },

    /// Subscribing to the topic set failed
    #[error("Subscription to {topics:?} failed: {reason}")]
    Subscription { topics: Vec<String>, reason: String },

    /// Broker could not be reached
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Non-recoverable client error
    #[error("Fatal consumer error: {0}")]
    Fatal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StreamError {
    /// Create a transient processing error
    pub fn transient(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Transient,
        }
    }

    /// Create a permanent processing error
    pub fn permanent(message: impl Into<String>) -> Self {
        StreamError::Processing {
            message: message.into(),
            category: ErrorCategory::Permanent,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Kafka(err) => kafka_error_category(err),
            StreamError::Serialization(_) => ErrorCategory::Permanent,
            StreamError::Processing { category, .. } => *category,
            StreamError::Subscription { .. } => ErrorCategory::Transient,
            StreamError::Unavailable(_) => ErrorCategory::Transient,
            StreamError::Fatal(_) => ErrorCategory::Fatal,
            StreamError::Config(_) => ErrorCategory::Permanent,
            StreamError::Internal(_) => ErrorCategory::Permanent,
        }
    }

    /// True when the consumer must stop
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Fatal
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

/// Classify a librdkafka error by its error code.
///
/// Errors without a code (client creation, canceled futures) are permanent.
pub fn kafka_error_category(err: &KafkaError) -> ErrorCategory {
    match err.rdkafka_error_code() {
        Some(RDKafkaErrorCode::Fatal) => ErrorCategory::Fatal,
        Some(
            RDKafkaErrorCode::QueueFull
            | RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::NetworkException
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::NotEnoughReplicas,
        ) => ErrorCategory::Transient,
        Some(_) => ErrorCategory::Permanent,
        None => ErrorCategory::Permanent,
    }
}
