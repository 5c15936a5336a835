use crate::{env_or_default, env_parse, ConfigError, FromEnv};
use std::net::{Ipv4Addr, SocketAddr};

/// HTTP listener configuration shared by the hub endpoint and health routes
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Get the server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parse the address into a `SocketAddr` for binding
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address()
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::ParseError {
                key: "HOST".to_string(),
                details: e.to_string(),
            })
    }
}

impl FromEnv for ServerConfig {
    /// - HOST: defaults to 0.0.0.0
    /// - PORT: defaults to 8080
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_or_default("HOST", &Ipv4Addr::UNSPECIFIED.to_string());
        let port = env_parse("PORT", 8080u16)?;
        Ok(Self { host, port })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED.to_string(), 8080)
    }
}
