//! Error types for the notifications domain.

use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur while sending event emails.
///
/// Missing credentials or recipients are not an error; they surface as
/// [`crate::EmailOutcome::Skipped`].
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The SMTP exchange itself failed (connection, auth, rejected message).
    #[error("SMTP transport error: {0}")]
    Transport(String),

    /// A sender or recipient address could not be parsed.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    Template(String),

    /// Message could not be assembled.
    #[error("Failed to build email message: {0}")]
    Message(String),
}

impl NotificationError {
    /// Label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationError::Transport(_) => "transport",
            NotificationError::InvalidAddress(_) => "invalid_address",
            NotificationError::Template(_) => "template",
            NotificationError::Message(_) => "message",
        }
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template(err.to_string())
    }
}

impl From<lettre::address::AddressError> for NotificationError {
    fn from(err: lettre::address::AddressError) -> Self {
        NotificationError::InvalidAddress(err.to_string())
    }
}

impl From<lettre::transport::smtp::Error> for NotificationError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        NotificationError::Transport(err.to_string())
    }
}
