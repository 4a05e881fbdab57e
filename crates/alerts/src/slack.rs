//! Slack chat sink using the Web API `chat.postMessage` call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{ChannelError, ChatSink};

/// Slack Web API root.
const SLACK_API_URL: &str = "https://slack.com/api";

/// Slack client posting to a fixed alert channel.
#[derive(Debug, Clone)]
pub struct SlackClient {
    token: String,
    channel: String,
    api_url: String,
    client: reqwest::Client,
}

impl SlackClient {
    /// Create a client for the given API token and channel identifier.
    #[must_use]
    pub fn new(token: String, channel: String) -> Self {
        Self {
            token,
            channel,
            api_url: SLACK_API_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Create a client with a custom API URL (for testing).
    #[cfg(test)]
    fn with_api_url(token: String, channel: String, api_url: String) -> Self {
        Self {
            token,
            channel,
            api_url,
            client: reqwest::Client::new(),
        }
    }

    /// Post `text` to the configured channel.
    ///
    /// Slack reports most failures inside a 200 response as
    /// `{"ok": false, "error": "..."}`, so both the HTTP status and the
    /// `ok` envelope are checked.
    async fn post_message(&self, text: &str) -> Result<(), ChannelError> {
        let endpoint = format!("{}/chat.postMessage", self.api_url);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&PostMessageRequest {
                channel: &self.channel,
                text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Slack request failed");
            return Err(ChannelError::Api {
                service: "slack",
                status,
                body,
            });
        }

        let envelope: PostMessageResponse = response.json().await?;
        if envelope.ok {
            debug!(channel = %self.channel, "chat message delivered");
            Ok(())
        } else {
            let error = envelope.error.unwrap_or_else(|| "unknown error".to_string());
            warn!(error = %error, "Slack rejected chat.postMessage");
            Err(ChannelError::Other(format!("Slack API error: {error}")))
        }
    }
}

#[async_trait]
impl ChatSink for SlackClient {
    async fn post(&self, text: &str) -> Result<(), ChannelError> {
        self.post_message(text).await
    }
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> SlackClient {
        SlackClient::with_api_url(
            "xoxb-test".to_string(),
            "#kafka-alerts".to_string(),
            server.uri(),
        )
    }

    #[tokio::test]
    async fn posts_channel_and_text_with_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_partial_json(json!({
                "channel": "#kafka-alerts",
                "text": ":fire: Broker down!\n",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        client.post(":fire: Broker down!\n").await.unwrap();
    }

    #[tokio::test]
    async fn surfaces_slack_error_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error": "channel_not_found",
            })))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.post("hello").await.unwrap_err();
        assert!(err.to_string().contains("channel_not_found"));
    }

    #[tokio::test]
    async fn surfaces_http_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = test_client(&server);
        let err = client.post("hello").await.unwrap_err();
        match err {
            ChannelError::Api { service, status, .. } => {
                assert_eq!(service, "slack");
                assert_eq!(status.as_u16(), 503);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
