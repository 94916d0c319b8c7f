//! Domain models for monitored bots and their status reports.

mod bot;
mod metrics;
mod report;

pub use bot::{Bot, BotId, BotRecord, report_url};
pub use metrics::{DerivationError, derive};
pub use report::{AssetBalance, Report};
