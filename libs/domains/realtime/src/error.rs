//! Hub error types

use crate::hub::ConnectionId;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    /// Missing or rejected access token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Broadcast could not be attempted at all
    #[error("Broadcast failed: {0}")]
    Broadcast(String),
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            HubError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            HubError::UnknownConnection(_) => (StatusCode::NOT_FOUND, "NotFound"),
            HubError::InvalidMessage(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            HubError::Broadcast(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };
        let body = json!({ "error": error, "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}
