//! Configuration for the subscription runner.

use crate::errors::{Result, SubflowError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`RunnerConfig::poll_interval_ms`].
pub const POLL_INTERVAL_ENV: &str = "SUBFLOW_POLL_INTERVAL_MS";
/// Environment variable overriding [`RunnerConfig::shutdown_timeout_ms`].
pub const SHUTDOWN_TIMEOUT_ENV: &str = "SUBFLOW_SHUTDOWN_TIMEOUT_MS";

/// Configuration for [`SubscriptionRunner`](super::SubscriptionRunner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// How long the supervisory loop sleeps when no task has finished.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long `shutdown` waits for each cancelled task.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    5000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl RunnerConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from the defaults overridden by environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns [`SubflowError::Config`] if a variable is set but is not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(raw) = lookup(POLL_INTERVAL_ENV) {
            config.poll_interval_ms = parse_millis(POLL_INTERVAL_ENV, &raw)?;
        }
        if let Some(raw) = lookup(SHUTDOWN_TIMEOUT_ENV) {
            config.shutdown_timeout_ms = parse_millis(SHUTDOWN_TIMEOUT_ENV, &raw)?;
        }
        Ok(config)
    }

    /// Sets the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the shutdown timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Returns the poll interval as a duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the shutdown timeout as a duration.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn parse_millis(name: &str, raw: &str) -> Result<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(SubflowError::Config(format!("{name} must be greater than zero"))),
        Ok(value) => Ok(value),
        Err(e) => Err(SubflowError::Config(format!("{name}={raw:?}: {e}"))),
    }
}

/// Per-subscription options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Stop normally after this many items. `None` runs until the source ends.
    #[serde(default)]
    pub max_items: Option<usize>,
}

impl SubscriptionOptions {
    /// Options for a subscription that handles a single item and completes.
    #[must_use]
    pub fn once() -> Self {
        Self { max_items: Some(1) }
    }

    /// Sets the item limit.
    #[must_use]
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let config: RunnerConfig = serde_json::from_str(r#"{"poll_interval_ms": 50}"#).unwrap();
        assert_eq!(config.poll_interval_ms, 50);
        assert_eq!(config.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_env_overrides() {
        let config = RunnerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "250")])).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.shutdown_timeout_ms, 5000);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let err = RunnerConfig::from_lookup(lookup(&[(POLL_INTERVAL_ENV, "soon")])).unwrap_err();
        assert_eq!(err.kind(), "config");

        let err = RunnerConfig::from_lookup(lookup(&[(SHUTDOWN_TIMEOUT_ENV, "0")])).unwrap_err();
        assert!(err.to_string().contains(SHUTDOWN_TIMEOUT_ENV));
    }

    #[test]
    fn test_subscription_options() {
        assert_eq!(SubscriptionOptions::default().max_items, None);
        assert_eq!(SubscriptionOptions::once().max_items, Some(1));
        assert_eq!(SubscriptionOptions::default().with_max_items(3).max_items, Some(3));
    }
}
