//! Capturing email provider for tests and local runs

use super::{EmailContent, EmailProvider, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Provider that records every email instead of sending it
#[derive(Clone, Default)]
pub struct MockEmailProvider {
    sent_emails: Arc<Mutex<Vec<EmailContent>>>,
    failure_message: Option<String>,
}

impl MockEmailProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose sends always fail with a transport error
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent_emails: Arc::default(),
            failure_message: Some(message.into()),
        }
    }

    pub async fn sent_emails(&self) -> Vec<EmailContent> {
        self.sent_emails.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent_emails.lock().await.len()
    }
}

#[async_trait]
impl EmailProvider for MockEmailProvider {
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
        if let Some(message) = &self.failure_message {
            return Err(NotificationError::Transport(message.clone()));
        }

        let mut sent = self.sent_emails.lock().await;
        sent.push(email.clone());
        Ok(SentEmail {
            message_id: Some(format!("mock-{}", sent.len())),
            recipients: email.to.len(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(self.failure_message.is_none())
    }
}
