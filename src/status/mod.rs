//! Status report retrieval from remote bots.

mod http;

pub use http::{HttpStatusClient, HttpStatusClientConfig};

use crate::domain::Report;
use async_trait::async_trait;
use thiserror::Error;

/// Status client errors.
#[derive(Debug, Error)]
pub enum StatusError {
    /// Transport failure or timeout.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status code.
    #[error("unexpected http status {0}")]
    HttpStatus(u16),

    /// Body is not a JSON report.
    #[error("malformed report: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result type for status operations.
pub type Result<T> = std::result::Result<T, StatusError>;

/// StatusClient fetches the raw status report of a bot.
///
/// Implementations issue exactly one request per call and never retry;
/// the scheduler retries on its next tick.
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Fetches and parses `{base_url}/report.json`.
    async fn fetch_report(&self, base_url: &str) -> Result<Report>;
}
