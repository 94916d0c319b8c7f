//! Monitor configuration.

use std::time::Duration;

use crate::config::{Config, DEFAULT_POLL_INTERVAL, DEFAULT_STORAGE_KEY};

/// Monitor configuration options.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Key of the registry blob in the store.
    pub storage_key: String,
    /// Application version, logged at startup.
    pub version: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl From<&Config> for MonitorConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll.interval,
            storage_key: config.storage.key.clone(),
            ..Self::default()
        }
    }
}
