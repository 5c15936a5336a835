//! Shared librdkafka client settings

use core_config::KafkaConfig;
use rdkafka::config::ClientConfig;

/// Base client config: bootstrap servers, client id and optional SASL/SSL.
pub(crate) fn base_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client = ClientConfig::new();
    client
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id);

    if let Some(security) = &config.security {
        client.set("security.protocol", &security.protocol);
        if let Some(mechanism) = &security.sasl_mechanism {
            client.set("sasl.mechanism", mechanism);
        }
        if let Some(username) = &security.sasl_username {
            client.set("sasl.username", username);
        }
        if let Some(password) = &security.sasl_password {
            client.set("sasl.password", password);
        }
    }

    client
}
