//! Ordered in-memory registry of monitored bots.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{Bot, BotId, Report};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("bot {0} not found")]
    NotFound(BotId),
}

/// BotRegistry owns the bots in display (insertion) order.
///
/// Every operation addresses bots by id, so a removal never shifts the
/// target of a later update.
#[derive(Debug, Default)]
pub struct BotRegistry {
    bots: Vec<Bot>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from already-constructed bots, keeping their order.
    pub fn from_bots(bots: Vec<Bot>) -> Self {
        Self { bots }
    }

    /// Appends a new bot without stats and returns its id.
    pub fn add(&mut self, name: impl Into<String>, url: impl Into<String>) -> BotId {
        let bot = Bot::new(name, url);
        let id = bot.id;
        self.bots.push(bot);
        id
    }

    /// Removes a bot and returns it.
    ///
    /// Callers owning in-flight requests must cancel them first.
    pub fn remove(&mut self, id: BotId) -> Result<Bot, RegistryError> {
        let index = self.position(id).ok_or(RegistryError::NotFound(id))?;
        Ok(self.bots.remove(index))
    }

    /// Returns a snapshot of all bots in display order.
    pub fn list(&self) -> Vec<Bot> {
        self.bots.clone()
    }

    /// Borrows all bots in display order.
    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    pub fn get(&self, id: BotId) -> Option<&Bot> {
        self.bots.iter().find(|b| b.id == id)
    }

    pub fn contains(&self, id: BotId) -> bool {
        self.get(id).is_some()
    }

    /// Returns the id of the bot shown at a zero-based position.
    pub fn id_at(&self, index: usize) -> Option<BotId> {
        self.bots.get(index).map(|b| b.id)
    }

    pub fn len(&self) -> usize {
        self.bots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bots.is_empty()
    }

    /// Replaces the stats snapshot of a bot.
    ///
    /// Returns false, touching nothing, if the bot is no longer registered.
    pub fn update_stats(&mut self, id: BotId, report: Report, updated: DateTime<Utc>) -> bool {
        match self.get_mut(id) {
            Some(bot) => {
                bot.stats = Some(report);
                bot.updated = Some(updated);
                true
            }
            None => false,
        }
    }

    /// Sets the in-flight flag of a bot. Returns false if it is gone.
    pub fn set_pending(&mut self, id: BotId, pending: bool) -> bool {
        match self.get_mut(id) {
            Some(bot) => {
                bot.pending_request = pending;
                true
            }
            None => false,
        }
    }

    /// Ids and base URLs of bots with no outstanding request.
    pub fn idle_targets(&self) -> Vec<(BotId, String)> {
        self.bots
            .iter()
            .filter(|b| !b.pending_request)
            .map(|b| (b.id, b.url.clone()))
            .collect()
    }

    fn get_mut(&mut self, id: BotId) -> Option<&mut Bot> {
        self.bots.iter_mut().find(|b| b.id == id)
    }

    fn position(&self, id: BotId) -> Option<usize> {
        self.bots.iter().position(|b| b.id == id)
    }
}
