//! Check-cycle controller: runs the evaluators, aggregates their findings,
//! and drives the incident lifecycle.
//!
//! The controller owns the process-lifetime [`IncidentState`] and the poll
//! cadence; nothing else mutates either. One cycle runs to completion before
//! the next sleep begins, so cycles can never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use alerts::{ChatSink, IncidentSink};

use crate::checks::{self, CheckResult};
use crate::client::StatusClient;
use crate::config::MonitorConfig;

/// Whether an incident is currently active, and the dedup key correlating
/// the open call with the eventual resolve.
#[derive(Debug, Default)]
struct IncidentState {
    alerting: bool,
    incident_key: Option<String>,
}

/// Runs check cycles and applies the alert decision.
pub struct Controller {
    client: StatusClient,
    chat: Arc<dyn ChatSink>,
    incidents: Option<Arc<dyn IncidentSink>>,
    state: IncidentState,
    expected_brokers: usize,
    max_lag: i64,
    excluded_consumers: Vec<String>,
    incident_summary: String,
    check_interval: Duration,
    backoff_interval: Duration,
}

impl Controller {
    /// Build a controller with its collaborators injected.
    pub fn new(
        client: StatusClient,
        chat: Arc<dyn ChatSink>,
        incidents: Option<Arc<dyn IncidentSink>>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            client,
            chat,
            incidents,
            state: IncidentState::default(),
            expected_brokers: config.expected_brokers,
            max_lag: config.max_lag,
            excluded_consumers: config.excluded_consumers.clone(),
            incident_summary: config.pagerduty_description.clone(),
            check_interval: config.check_interval,
            backoff_interval: config.backoff_interval,
        }
    }

    /// The cadence until the next cycle: backed off while alerting.
    pub fn current_interval(&self) -> Duration {
        if self.state.alerting {
            self.backoff_interval
        } else {
            self.check_interval
        }
    }

    /// Run the poll loop until the shutdown signal flips.
    ///
    /// The shutdown branch is only consulted between cycles, so an in-flight
    /// cycle always finishes before the loop exits.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            backoff_secs = self.backoff_interval.as_secs(),
            "health check loop starting"
        );

        loop {
            let interval = self.current_interval();
            tokio::select! {
                () = tokio::time::sleep(interval) => {
                    self.run_cycle().await;
                }
                _ = shutdown.changed() => {
                    info!("shutdown signal received, stopping health check loop");
                    break;
                }
            }
        }
    }

    /// Execute one full check cycle: fetch, evaluate, aggregate, settle.
    pub async fn run_cycle(&mut self) {
        let broker = checks::broker_count(&self.client, self.expected_brokers).await;

        let topics = match self.client.topics().await {
            Ok(topics) => {
                info!(topics = ?topics, "topics");
                topics
            }
            Err(e) => {
                warn!(error = %e, "topic listing failed, skipping topic checks this cycle");
                Vec::new()
            }
        };
        let unavailable = checks::unavailable_partitions(&self.client, &topics).await;
        let under_replicated = checks::under_replicated_partitions(&self.client, &topics).await;

        let consumers = match self.client.consumers_summary().await {
            Ok(consumers) => consumers,
            Err(e) => {
                warn!(error = %e, "consumer summary failed, skipping lag check this cycle");
                Vec::new()
            }
        };
        let lag = checks::consumer_lag(
            &self.client,
            &consumers,
            self.max_lag,
            &self.excluded_consumers,
        )
        .await;

        let outcome = checks::aggregate([broker, unavailable, under_replicated, lag]);
        self.settle(outcome).await;
    }

    /// Apply the state machine transition for this cycle's aggregate result.
    ///
    /// Chat is re-notified on every alerting cycle; the incident sink is
    /// opened once on entering the alerting state and resolved once on
    /// leaving it. Sink failures never roll back the transition.
    async fn settle(&mut self, outcome: CheckResult) {
        if outcome.should_alert {
            if let Err(e) = self.chat.post(&format!(":fire: {}", outcome.message)).await {
                error!(error = %e, "failed to deliver chat alert");
            }

            if !self.state.alerting {
                warn!("cluster unhealthy, entering alerting state");
                self.state.alerting = true;

                if let Some(incidents) = &self.incidents {
                    match incidents.trigger(&self.incident_summary, &outcome.message).await {
                        Ok(key) => {
                            info!(incident_key = %key, "incident opened");
                            self.state.incident_key = Some(key);
                        }
                        Err(e) => error!(error = %e, "failed to open incident"),
                    }
                }
            }
        } else if self.state.alerting {
            info!("cluster recovered, leaving alerting state");
            self.state.alerting = false;

            if let Err(e) = self.chat.post("Back to normal :beauty:").await {
                error!(error = %e, "failed to deliver recovery message");
            }

            if let Some(key) = self.state.incident_key.take() {
                if let Some(incidents) = &self.incidents {
                    match incidents.resolve(&key).await {
                        Ok(()) => info!(incident_key = %key, "incident resolved"),
                        Err(e) => error!(error = %e, "failed to resolve incident"),
                    }
                }
            }
        }
    }
}
