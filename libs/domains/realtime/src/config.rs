use crate::auth::{AllowAnonymous, ConnectionAuthorizer, StaticTokenAuthorizer};
use crate::error::HubError;
use crate::hub::DEFAULT_CHANNEL_CAPACITY;
use crate::message::HubMessageStyle;
use core_config::{env_optional, env_parse, ConfigError, FromEnv};
use std::sync::Arc;
use std::time::Duration;

/// Default period of the stats push
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 10;

/// Hub configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    pub style: HubMessageStyle,
    pub channel_capacity: usize,
    /// Token table for [`StaticTokenAuthorizer`]; anonymous access when unset
    pub access_tokens: Option<String>,
    /// Period of the stats push; `None` turns it off
    pub stats_interval: Option<Duration>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            style: HubMessageStyle::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            access_tokens: None,
            stats_interval: Some(Duration::from_secs(DEFAULT_STATS_INTERVAL_SECS)),
        }
    }
}

impl HubSettings {
    pub fn authorizer(&self) -> Result<Arc<dyn ConnectionAuthorizer>, HubError> {
        Ok(match &self.access_tokens {
            Some(table) => Arc::new(StaticTokenAuthorizer::parse(table)?),
            None => Arc::new(AllowAnonymous),
        })
    }
}

impl FromEnv for HubSettings {
    /// - HUB_MESSAGE_STYLE: events | logistics (default events)
    /// - HUB_CHANNEL_CAPACITY: per-connection queue (default 64)
    /// - HUB_ACCESS_TOKENS: `token=subject[:role,role];...`
    /// - HUB_STATS_INTERVAL_SECS: stats push period (default 10, 0 disables)
    fn from_env() -> Result<Self, ConfigError> {
        let stats_secs = env_parse("HUB_STATS_INTERVAL_SECS", DEFAULT_STATS_INTERVAL_SECS)?;
        Ok(Self {
            style: env_parse("HUB_MESSAGE_STYLE", HubMessageStyle::default())?,
            channel_capacity: env_parse("HUB_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?,
            access_tokens: env_optional("HUB_ACCESS_TOKENS"),
            stats_interval: (stats_secs > 0).then(|| Duration::from_secs(stats_secs)),
        })
    }
}
