//! Email provider implementations.
//!
//! This module contains the `EmailProvider` trait, the SMTP provider used in
//! deployments and a capturing provider for tests and local runs.

mod mock;
mod smtp;

pub use mock::MockEmailProvider;
pub use smtp::SmtpProvider;

use crate::error::NotificationResult;
use async_trait::async_trait;

/// Represents a sent email with provider-specific message ID.
#[derive(Debug, Clone)]
pub struct SentEmail {
    /// Provider-specific message ID for tracking.
    pub message_id: Option<String>,
    /// Number of recipients the message was addressed to.
    pub recipients: usize,
}

/// Transport-level priority flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmailPriority {
    #[default]
    Normal,
    High,
}

/// Email content ready for sending.
#[derive(Debug, Clone, Default)]
pub struct EmailContent {
    /// Recipient email addresses.
    pub to: Vec<String>,
    /// Email subject.
    pub subject: String,
    /// HTML body content.
    pub html_body: String,
    /// Plain text body content.
    pub text_body: String,
    pub priority: EmailPriority,
}

/// Trait for email sending providers.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Send an email.
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail>;

    /// Get the provider name for logging.
    fn name(&self) -> &'static str;

    /// Check if the provider can reach its server.
    async fn health_check(&self) -> NotificationResult<bool>;
}
