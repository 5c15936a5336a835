//! Email settings with environment overrides.

use core_config::{env_optional, ConfigError, FromEnv};
use std::str::FromStr;
use tracing::warn;

/// SMTP and recipient configuration for event emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// TLS relay when true, plain SMTP otherwise (Mailpit/MailHog).
    pub enable_ssl: bool,
    pub sender_email: String,
    pub sender_name: String,
    pub sender_password: String,
    pub recipients: Vec<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            enable_ssl: true,
            sender_email: String::new(),
            sender_name: "Port Management System".to_string(),
            sender_password: String::new(),
            recipients: Vec::new(),
        }
    }
}

impl EmailSettings {
    /// Apply deployment overrides on top of these values.
    ///
    /// Set, non-blank variables win. A numeric or boolean value that does
    /// not parse keeps the current value and logs a warning.
    ///
    /// - SMTP_HOST, SMTP_PORT, SMTP_ENABLE_SSL
    /// - SMTP_SENDER_EMAIL, SMTP_SENDER_NAME, SMTP_SENDER_PASSWORD
    /// - NOTIFICATION_RECIPIENTS: comma separated
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(host) = env_optional("SMTP_HOST") {
            self.smtp_host = host;
        }
        self.smtp_port = parse_override("SMTP_PORT", self.smtp_port);
        if let Some(raw) = env_optional("SMTP_ENABLE_SSL") {
            match parse_bool(&raw) {
                Some(value) => self.enable_ssl = value,
                None => warn!(key = "SMTP_ENABLE_SSL", value = %raw, "Ignoring unparsable override"),
            }
        }
        if let Some(email) = env_optional("SMTP_SENDER_EMAIL") {
            self.sender_email = email;
        }
        if let Some(name) = env_optional("SMTP_SENDER_NAME") {
            self.sender_name = name;
        }
        if let Some(password) = env_optional("SMTP_SENDER_PASSWORD") {
            self.sender_password = password;
        }
        if let Some(list) = env_optional("NOTIFICATION_RECIPIENTS") {
            self.recipients = split_recipients(&list);
        }
        self
    }

    /// Builder: replace the recipient list.
    pub fn with_recipients<I, T>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: set sender credentials.
    pub fn with_sender(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.sender_email = email.into();
        self.sender_password = password.into();
        self
    }

    /// Sender credentials and at least one recipient are present.
    pub fn is_configured(&self) -> bool {
        !self.sender_email.trim().is_empty()
            && !self.sender_password.is_empty()
            && self.recipients.iter().any(|r| !r.trim().is_empty())
    }
}

impl FromEnv for EmailSettings {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::default().with_env_overrides())
    }
}

fn parse_override<T>(key: &str, current: T) -> T
where
    T: FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env_optional(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(e) => {
                warn!(key, value = %raw, error = %e, "Ignoring unparsable override");
                current
            }
        },
        None => current,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn split_recipients(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_not_configured() {
        temp_env::with_vars_unset(
            [
                "SMTP_SENDER_EMAIL",
                "SMTP_SENDER_PASSWORD",
                "NOTIFICATION_RECIPIENTS",
            ],
            || {
                let settings = EmailSettings::from_env().unwrap();
                assert_eq!(settings.smtp_port, 587);
                assert!(!settings.is_configured());
            },
        );
    }

    #[test]
    fn test_env_overrides_win() {
        temp_env::with_vars(
            [
                ("SMTP_HOST", Some("mail.port.local")),
                ("SMTP_PORT", Some("2525")),
                ("SMTP_ENABLE_SSL", Some("false")),
                ("SMTP_SENDER_EMAIL", Some("alerts@port.local")),
                ("SMTP_SENDER_NAME", None),
                ("SMTP_SENDER_PASSWORD", Some("secret")),
                ("NOTIFICATION_RECIPIENTS", Some("ops@port.local, , harbour@port.local")),
            ],
            || {
                let settings = EmailSettings::default()
                    .with_recipients(["static@port.local"])
                    .with_env_overrides();

                assert_eq!(settings.smtp_host, "mail.port.local");
                assert_eq!(settings.smtp_port, 2525);
                assert!(!settings.enable_ssl);
                assert_eq!(settings.sender_name, "Port Management System");
                assert_eq!(settings.recipients, vec!["ops@port.local", "harbour@port.local"]);
                assert!(settings.is_configured());
            },
        );
    }

    #[test]
    fn test_unparsable_values_keep_static() {
        temp_env::with_vars(
            [("SMTP_PORT", Some("smtp")), ("SMTP_ENABLE_SSL", Some("maybe"))],
            || {
                let settings = EmailSettings::default().with_env_overrides();
                assert_eq!(settings.smtp_port, 587);
                assert!(settings.enable_ssl);
            },
        );
    }

    #[test]
    fn test_is_configured_requires_all_parts() {
        let base = EmailSettings::default().with_sender("alerts@port.local", "secret");
        assert!(!base.is_configured());
        assert!(base.clone().with_recipients(["ops@port.local"]).is_configured());
        assert!(!base.with_recipients(["  "]).is_configured());
    }
}
