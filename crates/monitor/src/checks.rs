//! The four health predicates and their aggregation.
//!
//! Every check yields a [`CheckResult`]: a human-readable finding and an
//! alert flag. Checks are side-effect-free beyond network reads, so a query
//! failure inside one check never disturbs its siblings — the failing check
//! logs once and reports whatever subset it evaluated before the error.

use tracing::{info, warn};

use crate::client::{ConsumerDescriptor, StatusClient};

/// Outcome of one predicate evaluation, merged by [`aggregate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Human-readable finding, suitable for a chat message.
    pub message: String,
    /// Whether this finding warrants an alert.
    pub should_alert: bool,
}

impl CheckResult {
    fn clean() -> Self {
        Self {
            message: String::new(),
            should_alert: false,
        }
    }
}

/// Alert when fewer than `expected` brokers are live.
///
/// A failed query suppresses the alert for this cycle; the next cycle is
/// the retry mechanism.
pub async fn broker_count(client: &StatusClient, expected: usize) -> CheckResult {
    match client.brokers().await {
        Ok(brokers) => {
            info!(live = brokers.len(), expected, "broker count");
            if brokers.len() < expected {
                CheckResult {
                    message: "Broker down!\n".to_string(),
                    should_alert: true,
                }
            } else {
                CheckResult::clean()
            }
        }
        Err(e) => {
            warn!(error = %e, "broker query failed, skipping broker check this cycle");
            CheckResult::clean()
        }
    }
}

/// Which per-topic partition list a topic check probes.
#[derive(Debug, Clone, Copy)]
enum TopicProbe {
    Unavailable,
    UnderReplicated,
}

impl TopicProbe {
    fn label(self) -> &'static str {
        match self {
            Self::Unavailable => "Unavailable topics!",
            Self::UnderReplicated => "Under replicated topics!",
        }
    }
}

/// Alert when any topic has unavailable partitions.
pub async fn unavailable_partitions(client: &StatusClient, topics: &[String]) -> CheckResult {
    topic_check(client, topics, TopicProbe::Unavailable).await
}

/// Alert when any topic has under-replicated partitions.
pub async fn under_replicated_partitions(client: &StatusClient, topics: &[String]) -> CheckResult {
    topic_check(client, topics, TopicProbe::UnderReplicated).await
}

/// Shared shape of the two per-topic partition checks.
///
/// The first failing query aborts the remaining topics; the topics already
/// evaluated stand as this cycle's result. The labeled line is emitted even
/// when clean so the operator sees the check ran.
async fn topic_check(client: &StatusClient, topics: &[String], probe: TopicProbe) -> CheckResult {
    let mut affected = Vec::new();

    for topic in topics {
        let partitions = match probe {
            TopicProbe::Unavailable => client.unavailable_partitions(topic).await,
            TopicProbe::UnderReplicated => client.under_replicated_partitions(topic).await,
        };

        match partitions {
            Ok(partitions) => {
                if !partitions.is_empty() {
                    affected.push(topic.clone());
                }
            }
            Err(e) => {
                warn!(error = %e, "topic query failed, using partial results");
                break;
            }
        }
    }

    info!(probe = ?probe, affected = ?affected, "topic check finished");

    CheckResult {
        should_alert: !affected.is_empty(),
        message: format!("{}\n{affected:?}\n", probe.label()),
    }
}

/// Alert when any non-excluded consumer lags more than `max_lag` behind on
/// any of its topics.
///
/// Excluded consumers are never queried. A consumer is flagged at most once;
/// the first failing lag query aborts the remaining (consumer, topic) pairs.
pub async fn consumer_lag(
    client: &StatusClient,
    consumers: &[ConsumerDescriptor],
    max_lag: i64,
    excluded: &[String],
) -> CheckResult {
    let mut lagging = Vec::new();

    'consumers: for consumer in consumers {
        if excluded.iter().any(|name| name == &consumer.name) {
            continue;
        }

        for topic in &consumer.topics {
            match client
                .consumer_topic_lag(&consumer.name, topic, consumer.kind)
                .await
            {
                Ok(lag) if lag > max_lag => {
                    warn!(consumer = %consumer.name, topic = %topic, lag, max_lag, "consumer lagging");
                    lagging.push(consumer.name.clone());
                    continue 'consumers;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "lag query failed, using partial results");
                    break 'consumers;
                }
            }
        }
    }

    info!(lagging = ?lagging, "consumer lag check finished");

    CheckResult {
        should_alert: !lagging.is_empty(),
        message: format!("Lagging consumers!\n{lagging:?}\n"),
    }
}

/// Merge evaluator outputs: OR of the alert flags, messages concatenated in
/// declaration order.
pub fn aggregate(results: impl IntoIterator<Item = CheckResult>) -> CheckResult {
    let mut merged = CheckResult::clean();
    for result in results {
        merged.message.push_str(&result.message);
        merged.should_alert |= result.should_alert;
    }
    merged
}
