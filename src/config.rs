//! Operator configuration from environment variables

use crate::controller::schedule::DEFAULT_REQUEUE_INTERVAL;
use crate::controller::time_source::{DEFAULT_TIME_API_TIMEOUT, DEFAULT_TIME_API_URL};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default port for health and metrics endpoints
pub const DEFAULT_HEALTH_PORT: u16 = 8080;

/// Default port for the admission webhook
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Base URL of the time API; the timezone is appended as a path segment
    pub time_api_url: String,
    /// Timeout for a single time API request
    pub time_api_timeout: Duration,
    /// Fixed interval between reconciliations, also used after failures
    pub requeue_interval: Duration,
    pub health_port: u16,
    pub webhook_port: u16,
    /// Serve the pod mutation webhook alongside the controller
    pub webhook_enabled: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            time_api_url: DEFAULT_TIME_API_URL.to_string(),
            time_api_timeout: DEFAULT_TIME_API_TIMEOUT,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            health_port: DEFAULT_HEALTH_PORT,
            webhook_port: DEFAULT_WEBHOOK_PORT,
            webhook_enabled: true,
        }
    }
}

impl OperatorConfig {
    /// Create config from environment variables
    ///
    /// Uses:
    /// - `WORKLOAD_SCHEDULE_TIME_API_URL`
    /// - `WORKLOAD_SCHEDULE_TIME_API_TIMEOUT_SECS`
    /// - `WORKLOAD_SCHEDULE_REQUEUE_SECS`
    /// - `WORKLOAD_SCHEDULE_HEALTH_PORT`
    /// - `WORKLOAD_SCHEDULE_WEBHOOK_PORT`
    /// - `WORKLOAD_SCHEDULE_WEBHOOK_ENABLED` ("false" disables)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup; unparsable values fall back to defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            time_api_url: lookup("WORKLOAD_SCHEDULE_TIME_API_URL")
                .filter(|url| !url.is_empty())
                .unwrap_or(defaults.time_api_url),
            time_api_timeout: parse_or(
                &lookup,
                "WORKLOAD_SCHEDULE_TIME_API_TIMEOUT_SECS",
                defaults.time_api_timeout.as_secs(),
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.time_api_timeout),
            requeue_interval: parse_or(
                &lookup,
                "WORKLOAD_SCHEDULE_REQUEUE_SECS",
                defaults.requeue_interval.as_secs(),
            )
            .map(Duration::from_secs)
            .unwrap_or(defaults.requeue_interval),
            health_port: parse_or(&lookup, "WORKLOAD_SCHEDULE_HEALTH_PORT", defaults.health_port)
                .unwrap_or(defaults.health_port),
            webhook_port: parse_or(
                &lookup,
                "WORKLOAD_SCHEDULE_WEBHOOK_PORT",
                defaults.webhook_port,
            )
            .unwrap_or(defaults.webhook_port),
            webhook_enabled: lookup("WORKLOAD_SCHEDULE_WEBHOOK_ENABLED")
                .map(|v| v != "false")
                .unwrap_or(defaults.webhook_enabled),
        }
    }
}

/// Parse `key`, falling back to `default` with a warning when the value is invalid.
/// Zero is rejected for durations and ports alike.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default + std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.parse::<T>() {
        Ok(value) if value != T::default() => Some(value),
        _ => {
            warn!(key = key, value = %raw, default = %default, "Invalid value, using default");
            None
        }
    }
}
