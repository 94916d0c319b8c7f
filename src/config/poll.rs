//! Polling configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Default interval between poll ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Status polling settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// Interval between ticks (default: 60s).
    #[serde(default = "default_interval", with = "duration")]
    pub interval: Duration,
    /// Timeout of a single status request (default: 10s).
    #[serde(default, with = "duration")]
    pub request_timeout: Duration,
}

fn default_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::ZERO,
        }
    }
}
