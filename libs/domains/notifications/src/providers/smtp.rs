//! SMTP email provider implementation using lettre.

use super::{EmailContent, EmailPriority, EmailProvider, SentEmail};
use crate::error::{NotificationError, NotificationResult};
use crate::settings::EmailSettings;
use async_trait::async_trait;
use lettre::{
    message::{
        header::{ContentType, Header, HeaderName, HeaderValue},
        Mailbox, MultiPart, SinglePart,
    },
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::error::Error as StdError;
use tracing::{debug, error, info};

macro_rules! priority_header {
    ($ty:ident, $name:literal) => {
        #[derive(Debug, Clone)]
        struct $ty(String);

        impl Header for $ty {
            fn name() -> HeaderName {
                HeaderName::new_from_ascii_str($name)
            }

            fn parse(s: &str) -> Result<Self, Box<dyn StdError + Send + Sync>> {
                Ok(Self(s.to_string()))
            }

            fn display(&self) -> HeaderValue {
                HeaderValue::new(Self::name(), self.0.clone())
            }
        }
    };
}

priority_header!(XPriority, "X-Priority");
priority_header!(XMsMailPriority, "X-MSMail-Priority");
priority_header!(Importance, "Importance");

/// SMTP email provider.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    host: String,
    port: u16,
}

impl SmtpProvider {
    /// Create a provider from email settings. Does not connect.
    pub fn new(settings: &EmailSettings) -> NotificationResult<Self> {
        let transport = Self::build_transport(settings)?;
        let from = Self::sender_mailbox(settings)?;
        Ok(Self {
            transport,
            from,
            host: settings.smtp_host.clone(),
            port: settings.smtp_port,
        })
    }

    fn build_transport(settings: &EmailSettings) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let credentials = (!settings.sender_email.is_empty()).then(|| {
            Credentials::new(settings.sender_email.clone(), settings.sender_password.clone())
        });

        let transport = if settings.enable_ssl {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_host)
                .map_err(|e| NotificationError::Transport(format!("Failed to create SMTP relay: {}", e)))?
                .port(settings.smtp_port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            builder.build()
        } else {
            // Plain transport for local servers like Mailpit
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
                .port(settings.smtp_port);
            if let Some(credentials) = credentials {
                builder = builder.credentials(credentials);
            }
            builder.build()
        };

        Ok(transport)
    }

    fn sender_mailbox(settings: &EmailSettings) -> NotificationResult<Mailbox> {
        let address = if settings.sender_email.is_empty() {
            "noreply@localhost"
        } else {
            settings.sender_email.as_str()
        };
        Ok(Mailbox::new(Some(settings.sender_name.clone()), address.parse()?))
    }

    /// Build a lettre Message from EmailContent.
    fn build_message(&self, email: &EmailContent) -> NotificationResult<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(&email.subject);

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|e| NotificationError::InvalidAddress(format!("'{}': {}", to, e)))?;
            builder = builder.to(mailbox);
        }

        if email.priority == EmailPriority::High {
            builder = builder
                .header(XPriority("1".to_string()))
                .header(XMsMailPriority("High".to_string()))
                .header(Importance("high".to_string()));
        }

        builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(email.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(email.html_body.clone()),
                    ),
            )
            .map_err(|e| NotificationError::Message(e.to_string()))
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, email: &EmailContent) -> NotificationResult<SentEmail> {
        debug!(
            recipients = email.to.len(),
            subject = %email.subject,
            host = %self.host,
            port = self.port,
            priority = ?email.priority,
            "Sending email via SMTP"
        );

        let message = self.build_message(email)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(host = %self.host, error = %e, "Failed to send email via SMTP");
            NotificationError::from(e)
        })?;

        let message_id = response.message().next().map(|s| s.to_string());

        info!(
            recipients = email.to.len(),
            message_id = ?message_id,
            "Email sent successfully via SMTP"
        );

        Ok(SentEmail {
            message_id,
            recipients: email.to.len(),
        })
    }

    fn name(&self) -> &'static str {
        "SMTP"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(self.transport.test_connection().await?)
    }
}
