use crate::{env_optional, env_or_default, env_parse, ConfigError, FromEnv};

/// Broker value that selects the in-process broker instead of a real cluster.
pub const MEMORY_BROKER: &str = "memory";

/// Optional SASL/SSL settings for managed Kafka offerings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KafkaSecurity {
    /// `security.protocol`, e.g. `SASL_SSL`
    pub protocol: String,
    /// `sasl.mechanism`, e.g. `PLAIN` or `SCRAM-SHA-512`
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
}

/// Kafka connection settings shared by producers and consumers
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,
    /// Consumer group id
    pub group_id: String,
    /// Client id reported to the broker
    pub client_id: String,
    pub session_timeout_ms: u32,
    pub max_poll_interval_ms: u32,
    /// Producer delivery timeout
    pub message_timeout_ms: u32,
    /// Retries of a transient publish failure before it is surfaced
    pub publish_max_retries: u32,
    pub security: Option<KafkaSecurity>,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            group_id: group_id.into(),
            client_id: "port-events".to_string(),
            session_timeout_ms: 10_000,
            max_poll_interval_ms: 300_000,
            message_timeout_ms: 10_000,
            publish_max_retries: 3,
            security: None,
        }
    }

    pub fn with_security(mut self, security: KafkaSecurity) -> Self {
        self.security = Some(security);
        self
    }

    /// True when the in-process broker was requested (`KAFKA_BROKERS=memory`)
    pub fn is_memory(&self) -> bool {
        self.brokers.trim().eq_ignore_ascii_case(MEMORY_BROKER)
    }
}

impl FromEnv for KafkaConfig {
    /// - KAFKA_BROKERS: defaults to localhost:9092
    /// - KAFKA_GROUP_ID: defaults to port-events-consumer
    /// - KAFKA_CLIENT_ID: defaults to port-events
    /// - KAFKA_SESSION_TIMEOUT_MS / KAFKA_MAX_POLL_INTERVAL_MS / KAFKA_MESSAGE_TIMEOUT_MS
    /// - KAFKA_PUBLISH_MAX_RETRIES: defaults to 3
    /// - KAFKA_SECURITY_PROTOCOL, KAFKA_SASL_MECHANISM, KAFKA_SASL_USERNAME, KAFKA_SASL_PASSWORD
    fn from_env() -> Result<Self, ConfigError> {
        let security = env_optional("KAFKA_SECURITY_PROTOCOL").map(|protocol| KafkaSecurity {
            protocol,
            sasl_mechanism: env_optional("KAFKA_SASL_MECHANISM"),
            sasl_username: env_optional("KAFKA_SASL_USERNAME"),
            sasl_password: env_optional("KAFKA_SASL_PASSWORD"),
        });

        Ok(Self {
            brokers: env_or_default("KAFKA_BROKERS", "localhost:9092"),
            group_id: env_or_default("KAFKA_GROUP_ID", "port-events-consumer"),
            client_id: env_or_default("KAFKA_CLIENT_ID", "port-events"),
            session_timeout_ms: env_parse("KAFKA_SESSION_TIMEOUT_MS", 10_000)?,
            max_poll_interval_ms: env_parse("KAFKA_MAX_POLL_INTERVAL_MS", 300_000)?,
            message_timeout_ms: env_parse("KAFKA_MESSAGE_TIMEOUT_MS", 10_000)?,
            publish_max_retries: env_parse("KAFKA_PUBLISH_MAX_RETRIES", 3)?,
            security,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KAFKA_VARS: [&str; 11] = [
        "KAFKA_BROKERS",
        "KAFKA_GROUP_ID",
        "KAFKA_CLIENT_ID",
        "KAFKA_SESSION_TIMEOUT_MS",
        "KAFKA_MAX_POLL_INTERVAL_MS",
        "KAFKA_MESSAGE_TIMEOUT_MS",
        "KAFKA_PUBLISH_MAX_RETRIES",
        "KAFKA_SECURITY_PROTOCOL",
        "KAFKA_SASL_MECHANISM",
        "KAFKA_SASL_USERNAME",
        "KAFKA_SASL_PASSWORD",
    ];

    #[test]
    fn test_kafka_config_defaults() {
        temp_env::with_vars_unset(KAFKA_VARS, || {
            let config = KafkaConfig::from_env().unwrap();
            assert_eq!(config.brokers, "localhost:9092");
            assert_eq!(config.group_id, "port-events-consumer");
            assert_eq!(config.session_timeout_ms, 10_000);
            assert_eq!(config.publish_max_retries, 3);
            assert!(config.security.is_none());
            assert!(!config.is_memory());
        });
    }

    #[test]
    fn test_kafka_config_with_sasl() {
        temp_env::with_vars(
            [
                ("KAFKA_BROKERS", Some("broker-1:9093,broker-2:9093")),
                ("KAFKA_SECURITY_PROTOCOL", Some("SASL_SSL")),
                ("KAFKA_SASL_MECHANISM", Some("PLAIN")),
                ("KAFKA_SASL_USERNAME", Some("$ConnectionString")),
                ("KAFKA_SASL_PASSWORD", Some("secret")),
            ],
            || {
                let config = KafkaConfig::from_env().unwrap();
                let security = config.security.unwrap();
                assert_eq!(security.protocol, "SASL_SSL");
                assert_eq!(security.sasl_mechanism.as_deref(), Some("PLAIN"));
                assert_eq!(security.sasl_password.as_deref(), Some("secret"));
            },
        );
    }

    #[test]
    fn test_kafka_config_invalid_timeout() {
        temp_env::with_var("KAFKA_SESSION_TIMEOUT_MS", Some("soon"), || {
            let err = KafkaConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("KAFKA_SESSION_TIMEOUT_MS"));
        });
    }

    #[test]
    fn test_kafka_config_publish_retries() {
        temp_env::with_var("KAFKA_PUBLISH_MAX_RETRIES", Some("7"), || {
            assert_eq!(KafkaConfig::from_env().unwrap().publish_max_retries, 7);
        });
    }

    #[test]
    fn test_memory_broker() {
        assert!(KafkaConfig::new("memory", "group").is_memory());
        assert!(KafkaConfig::new(" MEMORY ", "group").is_memory());
    }
}
