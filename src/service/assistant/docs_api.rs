//! HTTP client for the documentation assistant API.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::base::{config::Config, types::Res};

use super::{AssistantClient, AssistantError, AssistantReply, GenericAssistantClient, parse_reply};

// Extra methods on `AssistantClient` applied by the HTTP implementation.

impl AssistantClient {
    /// Creates an assistant client over the documentation assistant HTTP API.
    pub fn docs_api(config: &Config) -> Res<Self> {
        let client = DocsApiAssistantClient::new(&config.assistant_api_url, &config.assistant_api_key, config.assistant_timeout())?;
        Ok(Self { inner: Arc::new(client) })
    }
}

// Wire types.

#[derive(Debug, Serialize)]
struct CreateTopicRequest {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicResponse {
    topic_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageRequest<'a> {
    topic_id: &'a str,
    message: &'a str,
}

// Specific implementations.

/// Documentation assistant client implementation.
#[derive(Clone)]
pub struct DocsApiAssistantClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl DocsApiAssistantClient {
    /// Create a new client for the API rooted at `api_url`.
    #[instrument(name = "DocsApiAssistantClient::new", skip_all)]
    pub fn new(api_url: &str, api_key: &str, timeout: Option<Duration>) -> Res<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!("docs-relay/", env!("CARGO_PKG_VERSION")));

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }
}

/// Turns a non-success response into a `Rejected` error carrying the raw body.
async fn ensure_success(response: Response) -> Result<Response, AssistantError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("Assistant API answered with status {}.", status);

    Err(AssistantError::Rejected { status: status.as_u16(), body })
}

#[async_trait]
impl GenericAssistantClient for DocsApiAssistantClient {
    #[instrument(name = "DocsApiAssistantClient::create_session", skip_all)]
    async fn create_session(&self) -> Result<String, AssistantError> {
        let response = self.http.post(self.endpoint("chat/topic")).bearer_auth(&self.api_key).json(&CreateTopicRequest {}).send().await?;
        let response = ensure_success(response).await?;

        let body = response.text().await?;
        let topic: CreateTopicResponse = serde_json::from_str(&body).map_err(|e| AssistantError::Malformed(format!("{e}: {body}")))?;

        info!("Created assistant session `{}`.", topic.topic_id);

        Ok(topic.topic_id)
    }

    #[instrument(name = "DocsApiAssistantClient::post_turn", skip(self, message))]
    async fn post_turn(&self, session_id: &str, message: &str) -> Result<AssistantReply, AssistantError> {
        let request = PostMessageRequest { topic_id: session_id, message };

        let response = self.http.post(self.endpoint("chat/message")).bearer_auth(&self.api_key).json(&request).send().await?;
        let response = ensure_success(response).await?;

        let body = response.text().await?;
        debug!("Assistant answered with {} bytes.", body.len());

        Ok(parse_reply(&body))
    }
}

// Tests.

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::service::assistant::Citation;

    fn client(server: &MockServer) -> DocsApiAssistantClient {
        DocsApiAssistantClient::new(&server.base_url(), "secret-key", None).unwrap()
    }

    #[tokio::test]
    async fn create_session_returns_topic_id() {
        let server = MockServer::start_async().await;
        let topic = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/topic").header("authorization", "Bearer secret-key");
                then.status(200).json_body(json!({ "topicId": "topic-123" }));
            })
            .await;

        let session = client(&server).create_session().await.unwrap();

        topic.assert_async().await;
        assert_eq!(session, "topic-123");
    }

    #[tokio::test]
    async fn create_session_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/topic");
                then.status(401).body("invalid key");
            })
            .await;

        let err = client(&server).create_session().await.unwrap_err();

        match err {
            AssistantError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_session_rejects_unexpected_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/topic");
                then.status(200).json_body(json!({ "id": "nope" }));
            })
            .await;

        let err = client(&server).create_session().await.unwrap_err();

        assert!(matches!(err, AssistantError::Malformed(_)));
    }

    #[tokio::test]
    async fn post_turn_sends_topic_and_message() {
        let server = MockServer::start_async().await;
        let message = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/message")
                    .header("authorization", "Bearer secret-key")
                    .json_body(json!({ "topicId": "topic-1", "message": "How do I deploy?" }));
                then.status(200).body("Use the CLI.||[{\"link\":\"deploy\",\"metadata\":{\"title\":\"Deploying\"}}]");
            })
            .await;

        let reply = client(&server).post_turn("topic-1", "How do I deploy?").await.unwrap();

        message.assert_async().await;
        assert_eq!(reply.text, "Use the CLI.");
        assert_eq!(
            reply.sources,
            vec![Citation {
                link: "deploy".to_string(),
                title: Some("Deploying".to_string())
            }]
        );
    }

    #[tokio::test]
    async fn post_turn_surfaces_server_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/message");
                then.status(502).body("upstream down");
            })
            .await;

        let err = client(&server).post_turn("topic-1", "hi").await.unwrap_err();

        assert!(matches!(err, AssistantError::Rejected { status: 502, .. }));
    }

    #[tokio::test]
    async fn unreachable_api_is_unavailable() {
        let client = DocsApiAssistantClient::new("http://127.0.0.1:9", "key", Some(Duration::from_secs(2))).unwrap();

        let err = client.create_session().await.unwrap_err();

        assert!(matches!(err, AssistantError::Unavailable(_)));
    }
}
