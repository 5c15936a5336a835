//! Event domain error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use kafka_worker::StreamError;
use serde_json::json;
use thiserror::Error;

/// Result type for event operations
pub type Result<T> = std::result::Result<T, EventError>;

/// Publishing failures, surfaced to the caller that raised the event
#[derive(Debug, Error)]
pub enum PublishError {
    /// Topic name was empty
    #[error("Topic must not be empty")]
    InvalidTopic,

    /// Event could not be encoded
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker did not accept the record after retries
    #[error("Failed to deliver event to {topic}: {source}")]
    Delivery {
        topic: String,
        #[source]
        source: StreamError,
    },
}

/// Event domain errors
#[derive(Debug, Error)]
pub enum EventError {
    /// Event not found
    #[error("Event not found: {id}")]
    NotFound { id: String },

    /// Validation error
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Event store failure
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Publishing to the broker failed
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<validator::ValidationErrors> for EventError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl EventError {
    fn status_code(&self) -> StatusCode {
        match self {
            EventError::NotFound { .. } => StatusCode::NOT_FOUND,
            EventError::Validation { .. } => StatusCode::BAD_REQUEST,
            EventError::Publish(PublishError::InvalidTopic) => StatusCode::INTERNAL_SERVER_ERROR,
            EventError::Publish(_) => StatusCode::BAD_GATEWAY,
            EventError::Storage { .. } | EventError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            EventError::NotFound { .. } => "NotFound",
            EventError::Validation { .. } => "BadRequest",
            EventError::Publish(_) => "BadGateway",
            EventError::Storage { .. } | EventError::Internal { .. } => "InternalServerError",
        }
    }
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Event request failed");
        }

        let body = json!({
            "error": self.error_type(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            EventError::NotFound { id: "x".into() }.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EventError::Validation { message: "bad".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
        let delivery = EventError::from(PublishError::Delivery {
            topic: "port-events".into(),
            source: StreamError::Unavailable("down".into()),
        });
        assert_eq!(delivery.status_code(), StatusCode::BAD_GATEWAY);
        assert!(delivery.to_string().contains("port-events"));
    }
}
