//! Notification sinks for the Kafka health monitor.
//!
//! Two kinds of sink exist, with deliberately different lifecycles:
//!
//! - [`ChatSink`] receives the alert body on every alerting cycle plus a
//!   single recovery notice, keeping chat visibility continuous during an
//!   ongoing problem. Implemented by [`SlackClient`] over the Slack Web API.
//! - [`IncidentSink`] is opened and resolved exactly once per incident,
//!   correlated by the dedup key the service hands back on open. Implemented
//!   by [`PagerDutyClient`] over the Events API v2.
//!
//! Delivery is best-effort: callers log failures and move on, they never
//! retry within a check cycle.

pub mod pagerduty;
pub mod slack;

pub use pagerduty::PagerDutyClient;
pub use slack::SlackClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        /// Which sink produced the error
        service: &'static str,
        /// HTTP status code
        status: reqwest::StatusCode,
        /// Response body, for the logs
        body: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// A chat destination for human-readable health reports.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Post a message to the configured channel.
    async fn post(&self, text: &str) -> Result<(), ChannelError>;
}

/// An incident-management destination with an open/resolve lifecycle.
#[async_trait]
pub trait IncidentSink: Send + Sync {
    /// Open an incident and return the dedup key correlating future calls.
    async fn trigger(&self, summary: &str, details: &str) -> Result<String, ChannelError>;

    /// Resolve a previously opened incident by its dedup key.
    async fn resolve(&self, dedup_key: &str) -> Result<(), ChannelError>;
}
