//! reqwest-backed StatusClient.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::debug;

use super::{Result, StatusClient, StatusError};
use crate::config::PollConfig;
use crate::domain::{Report, report_url};

/// Default HTTP request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for creating a new HttpStatusClient.
#[derive(Debug, Clone)]
pub struct HttpStatusClientConfig {
    pub request_timeout: Duration,
}

impl Default for HttpStatusClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl From<&PollConfig> for HttpStatusClientConfig {
    fn from(config: &PollConfig) -> Self {
        let request_timeout = if config.request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            config.request_timeout
        };
        Self { request_timeout }
    }
}

/// HTTP client for bot status endpoints.
pub struct HttpStatusClient {
    http_client: HttpClient,
}

impl HttpStatusClient {
    /// Creates a new client.
    pub fn new(config: HttpStatusClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn fetch_report(&self, base_url: &str) -> Result<Report> {
        let url = report_url(base_url);

        debug!(url = %url, "fetching report");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StatusError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        parse_report(&body)
    }
}

/// Parses a report body.
pub(crate) fn parse_report(body: &[u8]) -> Result<Report> {
    Ok(serde_json::from_slice(body)?)
}
