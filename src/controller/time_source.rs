//! Current wall-clock time for a timezone, fetched from a World Time API
//! compatible endpoint (`GET {base}/{timezone}`).

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default World Time API base URL
pub const DEFAULT_TIME_API_URL: &str = "https://worldtimeapi.org/api/timezone";

/// Default timeout for a single time query
pub const DEFAULT_TIME_API_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum TimeError {
    #[error("failed to call time API: {0}")]
    Http(#[from] reqwest::Error),

    #[error("time API returned status {0}")]
    Status(u16),

    #[error("failed to parse time API response: {0}")]
    Parse(String),
}

/// Time as reported by the time source
///
/// Only `local`'s hour drives the schedule; the remaining fields are kept
/// for logging.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSnapshot {
    pub timezone: String,
    pub local: DateTime<FixedOffset>,
    pub utc_datetime: String,
    pub utc_offset: String,
}

/// Source of localized wall-clock time
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn current_time(&self, timezone: &str) -> Result<TimeSnapshot, TimeError>;
}

/// Response body of the time API. Only `datetime` is required.
#[derive(Debug, Deserialize)]
struct WorldTimeResponse {
    datetime: String,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    utc_datetime: String,
    #[serde(default)]
    utc_offset: String,
}

/// Parse a time API response body into a snapshot
pub fn parse_world_time(body: &str, timezone: &str) -> Result<TimeSnapshot, TimeError> {
    let resp: WorldTimeResponse =
        serde_json::from_str(body).map_err(|e| TimeError::Parse(e.to_string()))?;

    let local = DateTime::parse_from_rfc3339(&resp.datetime)
        .map_err(|e| TimeError::Parse(format!("datetime {:?}: {}", resp.datetime, e)))?;

    Ok(TimeSnapshot {
        timezone: if resp.timezone.is_empty() {
            timezone.to_string()
        } else {
            resp.timezone
        },
        local,
        utc_datetime: resp.utc_datetime,
        utc_offset: resp.utc_offset,
    })
}

/// HTTP client for the World Time API
#[derive(Clone)]
pub struct WorldTimeClient {
    http: reqwest::Client,
    base_url: String,
}

impl WorldTimeClient {
    /// Create a client with the given base URL and per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TimeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url_for(&self, timezone: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), timezone)
    }
}

#[async_trait]
impl TimeSource for WorldTimeClient {
    async fn current_time(&self, timezone: &str) -> Result<TimeSnapshot, TimeError> {
        let url = self.url_for(timezone);
        debug!(url = %url, "Querying time API");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TimeError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        parse_world_time(&body, timezone)
    }
}

#[cfg(test)]
#[path = "time_source_test.rs"]
mod tests;
