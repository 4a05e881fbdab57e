//! Environment configuration, read once at startup.
//!
//! Missing or malformed values for required variables are fatal: the
//! process refuses to start rather than poll undefined endpoints.

use std::env;
use std::time::Duration;

use thiserror::Error;

/// Configuration errors surfaced at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is absent
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    /// A variable is present but cannot be parsed
    #[error("environment variable {var} has invalid value {value:?}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// The offending value
        value: String,
    },
}

/// Process-wide configuration for the monitor daemon.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Base URL of the cluster status API.
    pub base_url: String,
    /// Basic-auth user for every status query.
    pub user: String,
    /// Basic-auth password for every status query.
    pub password: String,
    /// Expected number of live brokers.
    pub expected_brokers: usize,
    /// Per-(consumer, topic) total-lag alert threshold.
    pub max_lag: i64,
    /// Consumer names skipped entirely by the lag check.
    pub excluded_consumers: Vec<String>,
    /// Slack Web API token.
    pub slack_token: String,
    /// Slack channel receiving alerts.
    pub slack_channel: String,
    /// PagerDuty routing key; incident management is disabled when absent.
    pub pagerduty_routing_key: Option<String>,
    /// Summary line for triggered incidents.
    pub pagerduty_description: String,
    /// Poll cadence while healthy.
    pub check_interval: Duration,
    /// Poll cadence while an incident is active.
    pub backoff_interval: Duration,
}

impl MonitorConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required("MONITOR_URL")?,
            user: required("MONITOR_USER")?,
            password: required("MONITOR_PASSWORD")?,
            expected_brokers: parsed("LIVE_BROKERS", 3)?,
            max_lag: parsed("MAX_LAG", 40)?,
            excluded_consumers: env::var("EXCLUDED_CONSUMERS")
                .ok()
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            slack_token: required("SLACK_API_TOKEN")?,
            slack_channel: required("SLACK_ALERT_CHANNEL")?,
            pagerduty_routing_key: env::var("PAGERDUTY_ROUTING_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            pagerduty_description: env::var("PAGERDUTY_DESCRIPTION")
                .unwrap_or_else(|_| "Kafka cluster health".to_string()),
            check_interval: Duration::from_secs(parsed("CHECK_INTERVAL_SECS", 10)?),
            backoff_interval: Duration::from_secs(parsed("BACKOFF_INTERVAL_SECS", 300)?),
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    env::var(var)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parsed<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
