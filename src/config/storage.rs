//! Storage configuration.

use serde::Deserialize;

/// Default SQLite database file.
pub const DEFAULT_STORAGE_PATH: &str = "botwatch.db";

/// Default key under which the registry blob is stored.
pub const DEFAULT_STORAGE_KEY: &str = "bots";

/// Registry persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file (env: BOTWATCH_STORAGE_PATH).
    #[serde(default = "default_path")]
    pub path: String,
    /// Key of the registry blob.
    #[serde(default = "default_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            key: default_key(),
        }
    }
}

fn default_path() -> String {
    DEFAULT_STORAGE_PATH.to_string()
}

fn default_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}
