//! Registry persistence on top of a KeyValueStore.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::{KeyValueStore, StorageError};
use crate::domain::{Bot, BotRecord};

/// PersistenceGateway stores the whole registry as one JSON array blob.
///
/// Only `name`, `url`, `stats` and `updated` are written. Saving is refused
/// until the initial `load` has completed so that an empty registry built
/// during startup can never overwrite the persisted one.
pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
    key: String,
    loaded: AtomicBool,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            loaded: AtomicBool::new(false),
        }
    }

    /// Returns true once `load` has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Loads the persisted registry.
    ///
    /// Fails open: an absent, unreadable or malformed blob yields an empty
    /// registry. A failed read leaves the gateway unloaded so that saves
    /// stay refused and the persisted blob survives until a later load.
    pub async fn load(&self) -> Vec<Bot> {
        let bots = match self.store.get(&self.key).await {
            Ok(Some(blob)) => match serde_json::from_str::<Vec<BotRecord>>(&blob) {
                Ok(records) => records.into_iter().map(Bot::from).map(drop_partial_stats).collect(),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "Persisted registry is malformed, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => {
                debug!(key = %self.key, "No persisted registry");
                Vec::new()
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read persisted registry, saves disabled");
                return Vec::new();
            }
        };

        self.loaded.store(true, Ordering::SeqCst);
        info!(bots = bots.len(), "Registry loaded");
        bots
    }

    /// Writes the registry. Returns `Ok(false)` when skipped before load.
    pub async fn save(&self, bots: &[Bot]) -> Result<bool, StorageError> {
        if !self.is_loaded() {
            debug!("Save skipped, registry not loaded yet");
            return Ok(false);
        }

        let records: Vec<BotRecord> = bots.iter().map(Bot::to_record).collect();
        let blob = serde_json::to_string(&records)?;
        self.store.set(&self.key, &blob).await?;

        debug!(key = %self.key, bots = records.len(), "Registry saved");
        Ok(true)
    }

    /// Closes the underlying store.
    pub async fn close(&self) -> Result<(), StorageError> {
        self.store.close().await
    }
}

/// Stored stats must be fully derived; anything else is discarded.
fn drop_partial_stats(mut bot: Bot) -> Bot {
    if bot.stats.as_ref().is_some_and(|stats| !stats.is_derived()) {
        warn!(name = %bot.name, "Discarding persisted stats without derived metrics");
        bot.stats = None;
        bot.updated = None;
    }
    bot
}
