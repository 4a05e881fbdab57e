//! Kafka cluster health monitor.
//!
//! Polls a Kafka Manager-style status API on a fixed interval, evaluates
//! four health predicates (broker count, unavailable partitions,
//! under-replicated partitions, consumer lag), and drives Slack and
//! PagerDuty notifications through an incident state machine. While an
//! incident is active the poll interval backs off.

mod checks;
mod client;
mod config;
mod controller;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use alerts::{IncidentSink, PagerDutyClient, SlackClient};

use crate::client::StatusClient;
use crate::config::MonitorConfig;
use crate::controller::Controller;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Fail fast on missing or malformed configuration.
    let config = MonitorConfig::from_env()?;

    let client = StatusClient::new(&config.base_url, &config.user, &config.password)?;
    let chat = Arc::new(SlackClient::new(
        config.slack_token.clone(),
        config.slack_channel.clone(),
    ));
    let incidents: Option<Arc<dyn IncidentSink>> = match &config.pagerduty_routing_key {
        Some(key) => Some(Arc::new(PagerDutyClient::new(key.clone()))),
        None => {
            info!("PAGERDUTY_ROUTING_KEY not set, incident management disabled");
            None
        }
    };

    let controller = Controller::new(client, chat, incidents, &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    controller.run(shutdown_rx).await;

    info!("monitor stopped");
    Ok(())
}
