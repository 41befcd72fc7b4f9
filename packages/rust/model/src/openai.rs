//! Chat model client for OpenAI-compatible `/chat/completions` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use kbchat_shared::{KbChatError, ModelConfig, Result};

use crate::ChatModel;
use crate::sse::{WireError, sse_events};
use crate::types::{ChatOptions, ChatResponse, Message, StreamEvent, ToolCall};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("kbchat/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: WireError,
}

/// Client for any OpenAI-compatible chat completion API.
pub struct OpenAiCompatChat {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl OpenAiCompatChat {
    /// Create a client from `[model]` config. `api_key` is sent as a bearer
    /// token when present.
    ///
    /// `timeout_secs` bounds connecting and, for [`ChatModel::chat`], the
    /// whole request. Streamed answers are not cut off by it.
    pub fn new(config: &ModelConfig, api_key: Option<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| KbChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model_name.clone(),
            timeout,
        })
    }

    fn request(&self, messages: &[Message], opts: &ChatOptions, stream: bool) -> RequestBuilder {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            stream,
        };
        let builder = self.client.post(&self.endpoint).json(&body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| KbChatError::Network(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(KbChatError::Model(format!("HTTP {status}: {message}")))
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatChat {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> Result<ChatResponse> {
        let request = self.request(messages, opts, false).timeout(self.timeout);
        let response = self.send(request).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| KbChatError::Model(format!("invalid completion response: {e}")))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| KbChatError::Model("completion response has no choices".into()))?;

        let answer = ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect(),
            finish_reason: choice.finish_reason,
        };

        info!(
            content_len = answer.content.len(),
            tool_calls = answer.tool_calls.len(),
            "chat completion received"
        );
        Ok(answer)
    }

    #[instrument(skip_all, fields(model = %self.model, messages = messages.len()))]
    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
    ) -> Result<BoxStream<'static, StreamEvent>> {
        let response = self.send(self.request(messages, opts, true)).await?;
        debug!("chat stream opened");
        Ok(sse_events(response.bytes_stream()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> OpenAiCompatChat {
        let config = ModelConfig {
            base_url: format!("{}/v1/", server.uri()),
            model_name: "test-model".into(),
            ..Default::default()
        };
        OpenAiCompatChat::new(&config, api_key.map(Into::into)).unwrap()
    }

    fn client_with_timeout(server: &MockServer, timeout_secs: u64) -> OpenAiCompatChat {
        let config = ModelConfig {
            base_url: format!("{}/v1", server.uri()),
            timeout_secs,
            ..Default::default()
        };
        OpenAiCompatChat::new(&config, None).unwrap()
    }

    fn messages() -> Vec<Message> {
        vec![Message::system("be brief"), Message::user("hello")]
    }

    #[tokio::test]
    async fn chat_decodes_content_and_tool_calls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {
                        "content": "Hi there",
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "lookup", "arguments": "{}"}
                        }]
                    },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("sk-test"));
        let answer = client
            .chat(&messages(), &ChatOptions::default())
            .await
            .unwrap();

        assert_eq!(answer.content, "Hi there");
        assert_eq!(answer.tool_calls.len(), 1);
        assert_eq!(answer.tool_calls[0].name, "lookup");
        assert_eq!(answer.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn api_error_message_is_surfaced() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "invalid api key"}
            })))
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .chat(&messages(), &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, KbChatError::Model(_)));
        assert!(err.to_string().contains("invalid api key"));
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})),
            )
            .mount(&server)
            .await;

        let err = client_for(&server, None)
            .chat(&messages(), &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn chat_stream_yields_answer_events() {
        let server = MockServer::start().await;

        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" world\"},\"finish_reason\":\"stop\"}]}\n\n\
                    data: [DONE]\n\n";

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let stream = client_for(&server, None)
            .chat_stream(&messages(), &ChatOptions::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("Hello".into()),
                StreamEvent::Answer(" world".into()),
                StreamEvent::Done { tool_calls: vec![] },
            ]
        );
    }

    #[tokio::test]
    async fn slow_completion_hits_the_request_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(1500))
                    .set_body_json(serde_json::json!({
                        "choices": [{"message": {"content": "late"}, "finish_reason": "stop"}]
                    })),
            )
            .mount(&server)
            .await;

        let err = client_with_timeout(&server, 1)
            .chat(&messages(), &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, KbChatError::Network(_)));
    }

    #[tokio::test]
    async fn stream_outlives_the_request_timeout() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(1500))
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(
                        "data: {\"choices\":[{\"delta\":{\"content\":\"slow\"}}]}\n\ndata: [DONE]\n\n",
                    ),
            )
            .mount(&server)
            .await;

        let stream = client_with_timeout(&server, 1)
            .chat_stream(&messages(), &ChatOptions::default())
            .await
            .unwrap();
        let events: Vec<StreamEvent> = stream.collect().await;

        assert_eq!(
            events,
            vec![
                StreamEvent::Answer("slow".into()),
                StreamEvent::Done { tool_calls: vec![] },
            ]
        );
    }
}
