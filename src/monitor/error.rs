//! Monitor error types.

use crate::domain::{BotId, DerivationError};
use crate::registry::RegistryError;
use crate::status::StatusError;
use crate::storage::StorageError;

/// Errors returned by monitor operations.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("monitor has been stopped")]
    Stopped,
    #[error("bot {0} not found")]
    NotFound(BotId),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<RegistryError> for MonitorError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => MonitorError::NotFound(id),
        }
    }
}

/// Why a single poll produced no stats update.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}
