//! Chat completion clients.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};

use super::{AiError, ChatResponse, Message, StreamUpdate, Tool, ToolCall, stream};
use crate::config::AiConfig;

/// Provider-agnostic chat completion API.
#[async_trait]
pub trait AiClient: Send + Sync {
    /// One complete assistant turn.
    async fn chat(&self, messages: &[Message], tools: &[Tool]) -> Result<ChatResponse, AiError>;

    /// Streamed assistant turn; see [`stream::aggregate`].
    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<BoxStream<'static, Result<StreamUpdate, AiError>>, AiError>;
}

/// Client for DeepSeek (and any other OpenAI-compatible endpoint).
pub struct DeepSeekClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Tool],
}

fn no_tools(tools: &&[Tool]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

impl DeepSeekClient {
    pub fn new(config: &AiConfig) -> Result<Self, AiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[Tool],
        stream: bool,
    ) -> Result<reqwest::Response, AiError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
            tools,
        };

        let mut request = self
            .http
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body);
        if stream {
            request = request.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Api { status, body });
        }

        Ok(response)
    }
}

#[async_trait]
impl AiClient for DeepSeekClient {
    async fn chat(&self, messages: &[Message], tools: &[Tool]) -> Result<ChatResponse, AiError> {
        let response = self.send(messages, tools, false).await?;
        let body = response.text().await?;

        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AiError::Decode(format!("{e}, body: {body}")))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(AiError::EmptyResponse)?;

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_default(),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<BoxStream<'static, Result<StreamUpdate, AiError>>, AiError> {
        let response = self.send(messages, tools, true).await?;
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AiError::from));

        Ok(stream::aggregate(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::{FunctionDef, Role};
    use serde_json::json;
    use wiremock::matchers::{bearer_token, body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, DeepSeekClient) {
        let server = MockServer::start().await;
        let config = AiConfig {
            enabled: true,
            api_key: "sk-test".to_string(),
            base_url: format!("{}/", server.uri()),
            ..AiConfig::default()
        };
        (server, DeepSeekClient::new(&config).unwrap())
    }

    fn weather_tool() -> Tool {
        Tool {
            kind: "function",
            function: FunctionDef {
                name: "get_weather".to_string(),
                description: "weather".to_string(),
                parameters: json!({"type": "object"}),
            },
        }
    }

    #[tokio::test]
    async fn chat_sends_model_tools_and_parses_reply() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "stream": false,
                "max_tokens": 2000,
                "tools": [{"type": "function", "function": {"name": "get_weather"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "Hi!"},
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let reply = client
            .chat(&[Message::user("hello")], &[weather_tool()])
            .await
            .unwrap();

        assert_eq!(reply.content, "Hi!");
        assert_eq!(reply.finish_reason, "stop");
        assert!(reply.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn chat_parses_tool_calls() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "get_weather", "arguments": "{\"location\":\"Oslo\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let reply = client.chat(&[Message::user("weather?")], &[]).await.unwrap();

        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls[0].function.name, "get_weather");
        assert_eq!(reply.tool_calls[0].id, "call_1");
    }

    #[tokio::test]
    async fn non_success_status_carries_body() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client.chat(&[Message::user("x")], &[]).await.unwrap_err();
        match err {
            AiError::Api { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_is_an_error() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        assert!(matches!(
            client.chat(&[Message::user("x")], &[]).await,
            Err(AiError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn chat_stream_aggregates_sse_body() {
        let (server, client) = setup().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\",\"content\":\"Sun\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ny\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("accept", "text/event-stream"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let updates: Vec<_> = client
            .chat_stream(&[Message::user("weather?")], &[])
            .await
            .unwrap()
            .map(|u| u.unwrap())
            .collect()
            .await;

        assert_eq!(updates[0], StreamUpdate::Content("Sun".to_string()));
        assert_eq!(updates[1], StreamUpdate::Content("ny".to_string()));
        assert_eq!(
            updates[2],
            StreamUpdate::Finished(ChatResponse {
                content: "Sunny".to_string(),
                tool_calls: vec![],
                finish_reason: "stop".to_string(),
            })
        );
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn request_omits_empty_tools() {
        let messages = [Message {
            role: Role::User,
            content: "x".to_string(),
            tool_call_id: None,
            tool_calls: vec![],
        }];
        let body = CompletionRequest {
            model: "m",
            messages: &messages,
            temperature: 0.5,
            max_tokens: 10,
            stream: false,
            tools: &[],
        };

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
