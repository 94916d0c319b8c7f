//! Registered bot endpoint model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Report;

/// BotId is the stable identifier of a registered bot.
///
/// Ids are assigned when a bot enters the registry and are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BotId(Uuid);

impl BotId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bot is a remote endpoint whose status report is polled periodically.
#[derive(Debug, Clone, PartialEq)]
pub struct Bot {
    pub id: BotId,
    /// Display name chosen by the user.
    pub name: String,
    /// Base endpoint; the report lives at `{url}/report.json`.
    pub url: String,
    /// Last successfully derived report, `None` until the first good poll.
    pub stats: Option<Report>,
    /// When `stats` was last replaced.
    pub updated: Option<DateTime<Utc>>,
    /// True while a status request for this bot is outstanding.
    pub pending_request: bool,
}

impl Bot {
    /// Creates a bot with no stats.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: BotId::new(),
            name: name.into(),
            url: url.into(),
            stats: None,
            updated: None,
            pending_request: false,
        }
    }

    /// Returns the persisted form, stripped of id and transient state.
    pub fn to_record(&self) -> BotRecord {
        BotRecord {
            name: self.name.clone(),
            url: self.url.clone(),
            stats: self.stats.clone(),
            updated: self.updated,
        }
    }
}

/// Builds `{base}/report.json`, tolerating a trailing slash on the base.
pub fn report_url(base: &str) -> String {
    format!("{}/report.json", base.trim_end_matches('/'))
}

/// BotRecord is the persisted shape of a bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotRecord {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub stats: Option<Report>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl From<BotRecord> for Bot {
    fn from(record: BotRecord) -> Self {
        Self {
            id: BotId::new(),
            name: record.name,
            url: record.url,
            stats: record.stats,
            updated: record.updated,
            pending_request: false,
        }
    }
}
