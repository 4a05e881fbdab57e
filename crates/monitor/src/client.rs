//! Client for the cluster status API.
//!
//! Every query is an authenticated GET returning a small JSON envelope.
//! Non-success statuses become [`QueryError::Status`] with the full
//! endpoint recorded, so the owning check can log it and fall back to
//! whatever partial results it already has.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bound on any single status query, so one unresponsive endpoint cannot
/// starve the whole polling loop.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// A status query failed.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The API answered with a non-success status
    #[error("request {endpoint} failed with status {status}")]
    Status {
        /// Full URL of the failing query
        endpoint: String,
        /// HTTP status code
        status: StatusCode,
    },

    /// The request could not be completed (connect, timeout, bad body)
    #[error("request {endpoint} failed: {source}")]
    Transport {
        /// Full URL of the failing query
        endpoint: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },
}

/// One consumer group's subscriptions, as reported by the summary endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerDescriptor {
    /// Consumer group name.
    pub name: String,
    /// High-level or simple consumer.
    #[serde(rename = "type")]
    pub kind: ConsumerKind,
    /// Topics the group subscribes to.
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Consumer flavor, used as a path segment in per-topic lag queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerKind {
    /// High-level (group-coordinated) consumer.
    #[serde(rename = "HL", alias = "high-level")]
    HighLevel,
    /// Simple consumer.
    #[serde(rename = "SM", alias = "simple")]
    Simple,
}

impl ConsumerKind {
    fn as_path(self) -> &'static str {
        match self {
            Self::HighLevel => "HL",
            Self::Simple => "SM",
        }
    }
}

/// Authenticated client for the status API.
#[derive(Debug, Clone)]
pub struct StatusClient {
    base_url: String,
    user: String,
    password: String,
    client: reqwest::Client,
}

impl StatusClient {
    /// Create a client for the given base URL and basic-auth credentials.
    pub fn new(base_url: &str, user: &str, password: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(QUERY_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
            client,
        })
    }

    /// List live brokers. Only the count matters to the broker check, so
    /// broker records are passed through untyped.
    pub async fn brokers(&self) -> Result<Vec<serde_json::Value>, QueryError> {
        let body: BrokersResponse = self.get_json("brokers").await?;
        Ok(body.brokers)
    }

    /// List all topic names.
    pub async fn topics(&self) -> Result<Vec<String>, QueryError> {
        let body: TopicsResponse = self.get_json("topics").await?;
        Ok(body.topics)
    }

    /// Partitions of `topic` with fewer in-sync replicas than configured.
    pub async fn under_replicated_partitions(&self, topic: &str) -> Result<Vec<u32>, QueryError> {
        let body: UnderReplicatedResponse = self
            .get_json(&format!("{topic}/underReplicatedPartitions"))
            .await?;
        Ok(body.under_replicated_partitions)
    }

    /// Partitions of `topic` with no reachable leader.
    pub async fn unavailable_partitions(&self, topic: &str) -> Result<Vec<u32>, QueryError> {
        let body: UnavailableResponse = self
            .get_json(&format!("{topic}/unavailablePartitions"))
            .await?;
        Ok(body.unavailable_partitions)
    }

    /// Summaries of all known consumer groups.
    pub async fn consumers_summary(&self) -> Result<Vec<ConsumerDescriptor>, QueryError> {
        let body: ConsumersResponse = self.get_json("consumersSummary").await?;
        Ok(body.consumers)
    }

    /// Total lag of `consumer` on `topic`.
    pub async fn consumer_topic_lag(
        &self,
        consumer: &str,
        topic: &str,
        kind: ConsumerKind,
    ) -> Result<i64, QueryError> {
        let body: TopicSummaryResponse = self
            .get_json(&format!("{consumer}/{topic}/{}/topicSummary", kind.as_path()))
            .await?;
        Ok(body.total_lag)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, QueryError> {
        let endpoint = format!("{}/{path}", self.base_url);

        let response = self
            .client
            .get(&endpoint)
            .basic_auth(&self.user, Some(&self.password))
            .send()
            .await
            .map_err(|source| QueryError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::Status { endpoint, status });
        }

        response
            .json()
            .await
            .map_err(|source| QueryError::Transport { endpoint, source })
    }
}

#[derive(Debug, Deserialize)]
struct BrokersResponse {
    brokers: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UnderReplicatedResponse {
    #[serde(rename = "underReplicatedPartitions")]
    under_replicated_partitions: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct UnavailableResponse {
    #[serde(rename = "unavailablePartitions")]
    unavailable_partitions: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct ConsumersResponse {
    consumers: Vec<ConsumerDescriptor>,
}

#[derive(Debug, Deserialize)]
struct TopicSummaryResponse {
    #[serde(rename = "totalLag")]
    total_lag: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{basic_auth, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_client(server: &MockServer) -> StatusClient {
        StatusClient::new(&server.uri(), "admin", "secret").unwrap()
    }

    #[tokio::test]
    async fn brokers_sends_basic_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/brokers"))
            .and(basic_auth("admin", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "brokers": [{"id": 1}, {"id": 2}, {"id": 3}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let brokers = client.brokers().await.unwrap();
        assert_eq!(brokers.len(), 3);
    }

    #[tokio::test]
    async fn non_success_status_carries_endpoint_and_code() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/topics"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let err = client.topics().await.unwrap_err();
        match err {
            QueryError::Status { endpoint, status } => {
                assert!(endpoint.ends_with("/topics"));
                assert_eq!(status.as_u16(), 502);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn consumer_summary_parses_kind_and_topics() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/consumersSummary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "consumers": [
                    {"name": "billing", "type": "HL", "topics": ["payments", "refunds"]},
                    {"name": "audit", "type": "SM", "topics": ["events"]},
                ],
            })))
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let consumers = client.consumers_summary().await.unwrap();
        assert_eq!(consumers.len(), 2);
        assert_eq!(consumers[0].name, "billing");
        assert_eq!(consumers[0].kind, ConsumerKind::HighLevel);
        assert_eq!(consumers[1].kind, ConsumerKind::Simple);
        assert_eq!(consumers[1].topics, vec!["events"]);
    }

    #[tokio::test]
    async fn lag_query_uses_kind_path_segment() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/billing/payments/HL/topicSummary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalLag": 57,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server).await;
        let lag = client
            .consumer_topic_lag("billing", "payments", ConsumerKind::HighLevel)
            .await
            .unwrap();
        assert_eq!(lag, 57);
    }

    #[tokio::test]
    async fn trailing_slash_on_base_url_is_tolerated() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/topics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"topics": ["a"]})))
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let client = StatusClient::new(&base, "admin", "secret").unwrap();
        assert_eq!(client.topics().await.unwrap(), vec!["a"]);
    }
}
