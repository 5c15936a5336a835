//! Email template rendering engine.
//!
//! Handlebars templates for the two event emails: the standard notification
//! and the escalated critical alert.

use crate::error::{NotificationError, NotificationResult};
use domain_events::DomainEvent;
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// HTML body content.
    pub html: String,
    /// Plain text body content.
    pub text: String,
    /// Email subject line.
    pub subject: String,
}

/// Template data for event emails.
#[derive(Debug, Clone, Serialize)]
pub struct EventEmailData {
    pub event_id: String,
    pub event_type: String,
    pub category: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub occurred_at: String,
    pub requires_action: bool,
    /// "Ship #7" style references
    pub entities: Vec<String>,
    pub system_name: String,
}

impl EventEmailData {
    pub fn from_event(event: &DomainEvent, system_name: &str) -> Self {
        Self {
            event_id: event.id.to_string(),
            event_type: event.event_type.clone(),
            category: event.category.clone(),
            severity: event.severity.to_string(),
            title: event.title.clone(),
            description: event.description.clone(),
            source: event.source.clone(),
            occurred_at: event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            requires_action: event.requires_action,
            entities: event
                .entities
                .iter()
                .map(|(kind, id)| format!("{kind} #{id}"))
                .collect(),
            system_name: system_name.to_string(),
        }
    }
}

/// Template engine for rendering email templates.
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();

        for (name, source) in [
            ("event_notification_html", EVENT_NOTIFICATION_HTML_TEMPLATE),
            ("event_notification_text", EVENT_NOTIFICATION_TEXT_TEMPLATE),
            ("critical_alert_html", CRITICAL_ALERT_HTML_TEMPLATE),
            ("critical_alert_text", CRITICAL_ALERT_TEXT_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, source)
                .map_err(|e| NotificationError::Template(format!("Failed to register {}: {}", name, e)))?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    fn render<T: Serialize>(&self, template_name: &str, data: &T) -> NotificationResult<String> {
        Ok(self.handlebars.render(template_name, data)?)
    }

    /// Render the standard event notification.
    pub fn render_event_notification(&self, data: &EventEmailData) -> NotificationResult<RenderedEmail> {
        debug!(event_id = %data.event_id, "Rendering event notification email");

        Ok(RenderedEmail {
            html: self.render("event_notification_html", data)?,
            text: self.render("event_notification_text", data)?,
            subject: format!("[{}] {}: {}", data.severity, data.event_type, data.title),
        })
    }

    /// Render the escalated critical alert.
    pub fn render_critical_alert(&self, data: &EventEmailData) -> NotificationResult<RenderedEmail> {
        debug!(event_id = %data.event_id, "Rendering critical alert email");

        Ok(RenderedEmail {
            html: self.render("critical_alert_html", data)?,
            text: self.render("critical_alert_text", data)?,
            subject: format!("CRITICAL ALERT: {}", data.title),
        })
    }
}

// ============================================================================
// Email Templates
// ============================================================================

const EVENT_NOTIFICATION_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>{{title}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 32px; border-top: 4px solid #f59e0b;">
        <p style="color: #92400e; font-size: 12px; font-weight: 600; text-transform: uppercase; letter-spacing: 0.5px; margin: 0 0 8px 0;">
          {{severity}} &middot; {{category}}
        </p>
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">{{title}}</h1>
        <p style="color: #52525b; font-size: 15px; line-height: 22px; margin: 0 0 24px 0; white-space: pre-line;">{{description}}</p>
        <table width="100%" cellspacing="0" cellpadding="0" style="background-color: #f4f4f5; border-radius: 6px;">
          <tr><td style="padding: 16px; color: #52525b; font-size: 14px;">
            <p style="margin: 0 0 8px 0;"><strong>Event type:</strong> {{event_type}}</p>
            <p style="margin: 0 0 8px 0;"><strong>Occurred:</strong> {{occurred_at}}</p>
            {{#if source}}<p style="margin: 0 0 8px 0;"><strong>Source:</strong> {{source}}</p>{{/if}}
            {{#each entities}}<p style="margin: 0 0 8px 0;">{{this}}</p>{{/each}}
            <p style="margin: 0; color: #a1a1aa; font-size: 12px;">Event ID: {{event_id}}</p>
          </td></tr>
        </table>
        {{#if requires_action}}
        <p style="color: #b45309; font-size: 14px; margin: 24px 0 0 0;"><strong>This event requires action.</strong></p>
        {{/if}}
      </td>
    </tr>
    <tr>
      <td style="text-align: center; color: #a1a1aa; font-size: 12px; padding-top: 16px;">{{system_name}}</td>
    </tr>
  </table>
</body>
</html>"#;

const EVENT_NOTIFICATION_TEXT_TEMPLATE: &str = r#"[{{severity}}] {{title}}

{{description}}

Event type: {{event_type}}
Category: {{category}}
Occurred: {{occurred_at}}
{{#if source}}Source: {{source}}
{{/if}}{{#each entities}}{{this}}
{{/each}}
{{#if requires_action}}This event requires action.
{{/if}}
Event ID: {{event_id}}

---
{{system_name}}"#;

const CRITICAL_ALERT_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>CRITICAL ALERT: {{title}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #fef2f2;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #dc2626; border-radius: 8px 8px 0 0; padding: 20px; text-align: center;">
        <h1 style="color: #ffffff; font-size: 26px; font-weight: 800; letter-spacing: 1px; margin: 0;"><strong>CRITICAL ALERT</strong></h1>
      </td>
    </tr>
    <tr>
      <td style="background-color: #ffffff; border-radius: 0 0 8px 8px; padding: 32px;">
        <h2 style="color: #18181b; font-size: 20px; font-weight: 600; margin: 0 0 16px 0;">{{title}}</h2>
        <p style="color: #52525b; font-size: 15px; line-height: 22px; margin: 0 0 24px 0; white-space: pre-line;">{{description}}</p>
        <table width="100%" cellspacing="0" cellpadding="0" style="background-color: #fef2f2; border-radius: 6px; border-left: 4px solid #dc2626;">
          <tr><td style="padding: 16px; color: #7f1d1d; font-size: 14px;">
            <p style="margin: 0 0 8px 0;"><strong>Event type:</strong> {{event_type}}</p>
            <p style="margin: 0 0 8px 0;"><strong>Category:</strong> {{category}}</p>
            <p style="margin: 0 0 8px 0;"><strong>Occurred:</strong> {{occurred_at}}</p>
            {{#if source}}<p style="margin: 0 0 8px 0;"><strong>Source:</strong> {{source}}</p>{{/if}}
            {{#each entities}}<p style="margin: 0 0 8px 0;">{{this}}</p>{{/each}}
          </td></tr>
        </table>
        <h3 style="color: #18181b; font-size: 16px; font-weight: 600; margin: 24px 0 12px 0;">Immediate action required</h3>
        <ol style="color: #18181b; font-size: 14px; line-height: 22px; margin: 0; padding-left: 20px;">
          <li>Acknowledge this alert in the port operations console.</li>
          <li>Assess the affected equipment, berth or vessel on site.</li>
          <li>Notify the duty harbour master and terminal operations.</li>
          <li>Record the actions taken against the event.</li>
        </ol>
        <p style="color: #a1a1aa; font-size: 12px; margin: 24px 0 0 0;">Event ID: {{event_id}}</p>
      </td>
    </tr>
    <tr>
      <td style="text-align: center; color: #a1a1aa; font-size: 12px; padding-top: 16px;">{{system_name}}</td>
    </tr>
  </table>
</body>
</html>"#;

const CRITICAL_ALERT_TEXT_TEMPLATE: &str = r#"*** CRITICAL ALERT ***

{{title}}

{{description}}

Event type: {{event_type}}
Category: {{category}}
Occurred: {{occurred_at}}
{{#if source}}Source: {{source}}
{{/if}}{{#each entities}}{{this}}
{{/each}}
IMMEDIATE ACTION REQUIRED
=========================
1. Acknowledge this alert in the port operations console.
2. Assess the affected equipment, berth or vessel on site.
3. Notify the duty harbour master and terminal operations.
4. Record the actions taken against the event.

Event ID: {{event_id}}

---
{{system_name}}"#;
