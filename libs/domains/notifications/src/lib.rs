//! Notifications Domain
//!
//! Severity-gated email escalation for port events.
//!
//! - `High` events get the standard notification template
//! - `Critical` events get the escalated alert with high transport priority
//! - Lower severities never produce an email
//!
//! Settings come from static defaults with environment overrides on top.
//! Missing credentials or recipients disable sending with a warning; an SMTP
//! failure is returned to the caller as [`NotificationError::Transport`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{EmailNotifier, EmailSettings, EventNotifier, SmtpProvider};
//!
//! let settings = EmailSettings::default().with_env_overrides();
//! let notifier = EmailNotifier::new(settings.clone(), SmtpProvider::new(&settings)?)?;
//! notifier.send_critical_alert(&event).await?;
//! ```

pub mod error;
pub mod notifier;
pub mod providers;
pub mod settings;
pub mod templates;

pub use error::{NotificationError, NotificationResult};
pub use notifier::{EmailNotifier, EmailOutcome, EventNotifier, SkipReason};
pub use providers::{
    EmailContent, EmailPriority, EmailProvider, MockEmailProvider, SentEmail, SmtpProvider,
};
pub use settings::EmailSettings;
pub use templates::{EventEmailData, RenderedEmail, TemplateEngine};
