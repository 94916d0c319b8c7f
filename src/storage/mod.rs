//! Key-value storage and registry persistence.

mod gateway;
mod memory;
mod sqlite;

pub use gateway::PersistenceGateway;
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SqliteStoreConfig};

use async_trait::async_trait;

/// KeyValueStore persists opaque string blobs under string keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Closes the underlying connection.
    async fn close(&self) -> Result<(), StorageError>;
}

/// StorageError represents errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
