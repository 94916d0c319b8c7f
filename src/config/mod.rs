//! Configuration loading and validation.
//!
//! Uses serde_yaml to load YAML configuration files, with environment
//! variable overrides for deployment-specific paths.

mod app;
mod duration;
mod error;
mod poll;
mod storage;

pub use app::AppConfig;
pub use error::ConfigError;
pub use poll::{DEFAULT_POLL_INTERVAL, PollConfig};
pub use storage::{DEFAULT_STORAGE_KEY, DEFAULT_STORAGE_PATH, StorageConfig};

use serde::Deserialize;
use std::time::Duration;
use std::{env, fs};

/// Environment variable overriding `storage.path`.
const STORAGE_PATH_ENV: &str = "BOTWATCH_STORAGE_PATH";

/// Shortest accepted poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Root configuration structure.
///
/// Required sections: app. Optional sections: poll, storage.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Poll interval and request timeout.
    #[serde(default)]
    pub poll: PollConfig,
    /// Registry persistence.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present) so that `BOTWATCH_STORAGE_PATH`
    /// can override the configured database path.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if let Ok(path) = env::var(STORAGE_PATH_ENV) {
            if !path.is_empty() {
                config.storage.path = path;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parses YAML. Absent keys take their defaults; values are not validated.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.trim().is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.poll.interval < MIN_POLL_INTERVAL {
            return Err(ConfigError::Validation(format!(
                "poll.interval must be at least {:?}",
                MIN_POLL_INTERVAL
            )));
        }

        if self.storage.key.trim().is_empty() {
            return Err(ConfigError::Validation("storage.key must not be empty".into()));
        }

        if self.storage.path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "storage.path must not be empty".into(),
            ));
        }

        Ok(())
    }
}
