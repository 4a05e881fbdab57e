//! `PagerDuty` incident sink using the Events API v2.
//!
//! An incident is opened with a `trigger` event and closed with a `resolve`
//! event carrying the dedup key that the trigger response handed back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ChannelError, IncidentSink};

/// `PagerDuty` Events API root.
const EVENTS_API_URL: &str = "https://events.pagerduty.com";

/// `PagerDuty` client bound to one service routing key.
#[derive(Debug, Clone)]
pub struct PagerDutyClient {
    routing_key: String,
    source: String,
    api_url: String,
    client: reqwest::Client,
}

impl PagerDutyClient {
    /// Create a client for the given routing key.
    #[must_use]
    pub fn new(routing_key: String) -> Self {
        Self {
            routing_key,
            source: "kafka-monitor".to_string(),
            api_url: EVENTS_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the `source` field reported on triggered incidents.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Create a client with a custom API URL (for testing).
    #[cfg(test)]
    fn with_api_url(routing_key: String, api_url: String) -> Self {
        Self {
            routing_key,
            source: "kafka-monitor".to_string(),
            api_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send one event to the enqueue endpoint and return the dedup key.
    async fn enqueue(
        &self,
        action: EventAction,
        dedup_key: Option<&str>,
        payload: EventPayload,
    ) -> Result<String, ChannelError> {
        let endpoint = format!("{}/v2/enqueue", self.api_url);
        let request = EventRequest {
            routing_key: &self.routing_key,
            event_action: action,
            dedup_key,
            payload,
        };

        debug!(action = ?action, dedup_key = ?dedup_key, "sending PagerDuty event");

        let response = self.client.post(&endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "PagerDuty request failed");
            return Err(ChannelError::Api {
                service: "pagerduty",
                status,
                body,
            });
        }

        let envelope: EventResponse = response.json().await?;
        debug!(dedup_key = %envelope.dedup_key, "PagerDuty event accepted");
        Ok(envelope.dedup_key)
    }
}

#[async_trait]
impl IncidentSink for PagerDutyClient {
    async fn trigger(&self, summary: &str, details: &str) -> Result<String, ChannelError> {
        let payload = EventPayload {
            summary: summary.to_string(),
            source: self.source.clone(),
            severity: EventSeverity::Critical,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            class: Some("kafka".to_string()),
            custom_details: Some(serde_json::json!({ "report": details })),
        };
        self.enqueue(EventAction::Trigger, None, payload).await
    }

    async fn resolve(&self, dedup_key: &str) -> Result<(), ChannelError> {
        let payload = EventPayload {
            summary: "Resolved".to_string(),
            source: self.source.clone(),
            severity: EventSeverity::Info,
            timestamp: None,
            class: None,
            custom_details: None,
        };
        self.enqueue(EventAction::Resolve, Some(dedup_key), payload)
            .await?;
        Ok(())
    }
}

/// Event action accepted by the enqueue endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum EventAction {
    Trigger,
    Resolve,
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum EventSeverity {
    Critical,
    Info,
}

#[derive(Debug, Serialize)]
struct EventRequest<'a> {
    routing_key: &'a str,
    event_action: EventAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    dedup_key: Option<&'a str>,
    payload: EventPayload,
}

#[derive(Debug, Serialize)]
struct EventPayload {
    summary: String,
    source: String,
    severity: EventSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct EventResponse {
    dedup_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn accepted(dedup_key: &str) -> ResponseTemplate {
        ResponseTemplate::new(202).set_body_json(json!({
            "status": "success",
            "message": "Event processed",
            "dedup_key": dedup_key,
        }))
    }

    #[tokio::test]
    async fn trigger_returns_dedup_key_from_response() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_partial_json(json!({
                "routing_key": "rk-123",
                "event_action": "trigger",
                "payload": {
                    "summary": "Kafka cluster health",
                    "severity": "critical",
                    "source": "kafka-monitor",
                },
            })))
            .respond_with(accepted("abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_api_url("rk-123".to_string(), server.uri());
        let key = client
            .trigger("Kafka cluster health", "Broker down!\n")
            .await
            .unwrap();
        assert_eq!(key, "abc123");
    }

    #[tokio::test]
    async fn resolve_reuses_dedup_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .and(body_partial_json(json!({
                "event_action": "resolve",
                "dedup_key": "abc123",
            })))
            .respond_with(accepted("abc123"))
            .expect(1)
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_api_url("rk-123".to_string(), server.uri());
        client.resolve("abc123").await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v2/enqueue"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid routing key"))
            .mount(&server)
            .await;

        let client = PagerDutyClient::with_api_url("bad".to_string(), server.uri());
        let err = client.trigger("summary", "details").await.unwrap_err();
        assert!(err.to_string().contains("invalid routing key"));
    }

    #[test]
    fn trigger_payload_omits_absent_fields() {
        let request = EventRequest {
            routing_key: "rk",
            event_action: EventAction::Resolve,
            dedup_key: Some("abc123"),
            payload: EventPayload {
                summary: "Resolved".to_string(),
                source: "kafka-monitor".to_string(),
                severity: EventSeverity::Info,
                timestamp: None,
                class: None,
                custom_details: None,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"event_action\":\"resolve\""));
        assert!(json.contains("\"dedup_key\":\"abc123\""));
        assert!(!json.contains("custom_details"));
        assert!(!json.contains("timestamp"));
    }
}
