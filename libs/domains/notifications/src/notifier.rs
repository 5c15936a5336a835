//! Severity-gated email notifier for domain events.

use crate::error::NotificationResult;
use crate::providers::{EmailContent, EmailPriority, EmailProvider};
use crate::settings::EmailSettings;
use crate::templates::{EventEmailData, RenderedEmail, TemplateEngine};
use async_trait::async_trait;
use domain_events::{DomainEvent, Severity};
use metrics::counter;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Why no email went out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Severity below High
    BelowThreshold,
    /// Sender credentials or recipients missing
    NotConfigured,
}

impl SkipReason {
    fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::NotConfigured => "not_configured",
        }
    }
}

/// Result of a notifier call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailOutcome {
    Sent {
        message_id: Option<String>,
        recipients: usize,
    },
    Skipped(SkipReason),
}

impl EmailOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, EmailOutcome::Sent { .. })
    }
}

/// Email escalation entry points used by the event pipeline
#[async_trait]
pub trait EventNotifier: Send + Sync {
    /// Standard notification; no-op unless severity is High or Critical.
    async fn send_event_notification(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome>;

    /// Escalated alert with high transport priority, regardless of severity.
    async fn send_critical_alert(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome>;
}

/// [`EventNotifier`] that renders templates and sends through an [`EmailProvider`]
pub struct EmailNotifier<P: EmailProvider> {
    settings: EmailSettings,
    provider: Arc<P>,
    templates: TemplateEngine,
}

impl<P: EmailProvider> EmailNotifier<P> {
    pub fn new(settings: EmailSettings, provider: P) -> NotificationResult<Self> {
        if !settings.is_configured() {
            warn!("Email notifications disabled: sender credentials or recipients not configured");
        }
        Ok(Self {
            settings,
            provider: Arc::new(provider),
            templates: TemplateEngine::new()?,
        })
    }

    pub fn settings(&self) -> &EmailSettings {
        &self.settings
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    async fn deliver(
        &self,
        event: &DomainEvent,
        kind: &'static str,
        rendered: RenderedEmail,
        priority: EmailPriority,
    ) -> NotificationResult<EmailOutcome> {
        let email = EmailContent {
            to: self.settings.recipients.clone(),
            subject: rendered.subject,
            html_body: rendered.html,
            text_body: rendered.text,
            priority,
        };

        match self.provider.send(&email).await {
            Ok(sent) => {
                counter!("notification_emails_sent_total", "kind" => kind).increment(1);
                info!(
                    event_id = %event.id,
                    provider = self.provider.name(),
                    recipients = sent.recipients,
                    "Event email sent"
                );
                Ok(EmailOutcome::Sent {
                    message_id: sent.message_id,
                    recipients: sent.recipients,
                })
            }
            Err(e) => {
                counter!("notification_emails_failed_total", "kind" => kind, "error" => e.kind())
                    .increment(1);
                error!(
                    event_id = %event.id,
                    provider = self.provider.name(),
                    error = %e,
                    "Failed to send event email"
                );
                Err(e)
            }
        }
    }

    fn skipped(&self, event: &DomainEvent, kind: &'static str, reason: SkipReason) -> EmailOutcome {
        counter!("notification_emails_skipped_total", "kind" => kind, "reason" => reason.as_str())
            .increment(1);
        match reason {
            SkipReason::NotConfigured => warn!(
                event_id = %event.id,
                severity = %event.severity,
                "Email settings not configured, skipping event email"
            ),
            SkipReason::BelowThreshold => {}
        }
        EmailOutcome::Skipped(reason)
    }

    fn email_data(&self, event: &DomainEvent) -> EventEmailData {
        EventEmailData::from_event(event, &self.settings.sender_name)
    }
}

#[async_trait]
impl<P: EmailProvider> EventNotifier for EmailNotifier<P> {
    #[instrument(skip(self, event), fields(event_id = %event.id, severity = %event.severity))]
    async fn send_event_notification(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome> {
        const KIND: &str = "notification";

        if event.severity < Severity::High {
            return Ok(self.skipped(event, KIND, SkipReason::BelowThreshold));
        }
        if !self.settings.is_configured() {
            return Ok(self.skipped(event, KIND, SkipReason::NotConfigured));
        }

        let rendered = self.templates.render_event_notification(&self.email_data(event))?;
        self.deliver(event, KIND, rendered, EmailPriority::Normal).await
    }

    #[instrument(skip(self, event), fields(event_id = %event.id, severity = %event.severity))]
    async fn send_critical_alert(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome> {
        const KIND: &str = "critical_alert";

        if !self.settings.is_configured() {
            return Ok(self.skipped(event, KIND, SkipReason::NotConfigured));
        }

        let rendered = self.templates.render_critical_alert(&self.email_data(event))?;
        self.deliver(event, KIND, rendered, EmailPriority::High).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::providers::MockEmailProvider;
    use domain_events::EntityRefs;

    fn configured() -> EmailSettings {
        EmailSettings::default()
            .with_sender("alerts@port.local", "secret")
            .with_recipients(["ops@port.local", "harbour@port.local"])
    }

    fn event(severity: Severity) -> DomainEvent {
        DomainEvent::new("EquipmentFailure", "Berth", severity, "Crane 3 down")
            .with_entities(EntityRefs::berth(42))
    }

    #[tokio::test]
    async fn test_notification_gated_by_severity() {
        let provider = MockEmailProvider::new();
        let notifier = EmailNotifier::new(configured(), provider.clone()).unwrap();

        for severity in [Severity::Info, Severity::Low, Severity::Medium] {
            let outcome = notifier.send_event_notification(&event(severity)).await.unwrap();
            assert_eq!(outcome, EmailOutcome::Skipped(SkipReason::BelowThreshold));
        }
        assert_eq!(provider.sent_count().await, 0);

        let outcome = notifier.send_event_notification(&event(Severity::High)).await.unwrap();
        assert!(outcome.is_sent());
        let sent = provider.sent_emails().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to.len(), 2);
        assert_eq!(sent[0].priority, EmailPriority::Normal);
    }

    #[tokio::test]
    async fn test_critical_alert_is_high_priority() {
        let provider = MockEmailProvider::new();
        let notifier = EmailNotifier::new(configured(), provider.clone()).unwrap();

        // escalated template regardless of the event's own severity
        notifier.send_critical_alert(&event(Severity::Medium)).await.unwrap();

        let sent = provider.sent_emails().await;
        assert_eq!(sent[0].priority, EmailPriority::High);
        assert!(sent[0].subject.starts_with("CRITICAL ALERT"));
    }

    #[tokio::test]
    async fn test_unconfigured_skips_without_error() {
        let provider = MockEmailProvider::new();
        let notifier = EmailNotifier::new(EmailSettings::default(), provider.clone()).unwrap();

        assert_eq!(
            notifier.send_critical_alert(&event(Severity::Critical)).await.unwrap(),
            EmailOutcome::Skipped(SkipReason::NotConfigured)
        );
        assert_eq!(
            notifier.send_event_notification(&event(Severity::High)).await.unwrap(),
            EmailOutcome::Skipped(SkipReason::NotConfigured)
        );
        assert_eq!(provider.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let notifier =
            EmailNotifier::new(configured(), MockEmailProvider::failing("connection refused")).unwrap();

        let err = notifier.send_critical_alert(&event(Severity::Critical)).await.unwrap_err();
        assert!(matches!(err, NotificationError::Transport(_)));
    }
}
