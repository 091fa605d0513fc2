//! Chat assistant backed by an OpenAI-compatible chat completion API.
//!
//! [`AiService`] runs the tool-calling loop: it sends the conversation with
//! every enabled [`Skill`](skill::Skill) advertised as a tool, executes the
//! tool calls the model asks for and feeds the results back until the model
//! answers in plain text.

pub mod client;
pub mod skill;
pub mod stream;
pub mod weather;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::{cache::Cache, config::AiConfig};

pub use client::{AiClient, DeepSeekClient};
pub use skill::{Skill, SkillError, SkillRegistry};
pub use stream::StreamUpdate;
pub use weather::WeatherSkill;

/// Conversation rounds allowed before giving up on a tool loop.
pub const MAX_ROUNDS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode provider response: {0}")]
    Decode(String),

    #[error("provider returned no choices")]
    EmptyResponse,

    #[error("skill not found: {0}")]
    UnknownSkill(String),

    #[error("invalid arguments for {name}: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("skill {name} failed: {source}")]
    Skill {
        name: String,
        #[source]
        source: SkillError,
    },

    #[error("exceeded the maximum of {0} conversation rounds")]
    TooManyRounds(usize),
}

impl AiError {
    /// Text shown to callers. Provider and skill failures report only their kind.
    pub fn client_message(&self) -> String {
        match self {
            AiError::Http(_) | AiError::Api { .. } | AiError::Decode(_) | AiError::EmptyResponse => {
                "AI provider request failed".to_string()
            }
            AiError::Skill { name, .. } => format!("skill {name} failed"),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the conversation sent to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Function tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: FunctionDef,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool invocation requested by the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    pub arguments: String,
}

/// A complete assistant turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
}

/// Event pushed to streaming chat subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Content(String),
    ToolCalls(Vec<ToolCall>),
    Done { finish_reason: String },
    Error(String),
}

impl StreamEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Content(_) => "message",
            StreamEvent::ToolCalls(_) => "tool_calls",
            StreamEvent::Done { .. } => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    /// SSE event payload.
    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Content(content) => json!({ "content": content }),
            StreamEvent::ToolCalls(calls) => json!({ "tool_calls": calls }),
            StreamEvent::Done { finish_reason } => json!({ "finish_reason": finish_reason }),
            StreamEvent::Error(message) => json!({ "message": message }),
        }
    }
}

pub struct AiService {
    client: Arc<dyn AiClient>,
    skills: SkillRegistry,
    system_prompt: String,
}

impl AiService {
    pub fn new(client: Arc<dyn AiClient>, skills: SkillRegistry, system_prompt: String) -> Self {
        Self {
            client,
            skills,
            system_prompt,
        }
    }

    /// Build the service described by `config`.
    ///
    /// Returns `Ok(None)` when AI is disabled or the provider is unknown.
    /// `openai` is served by the DeepSeek client since both speak the same
    /// protocol.
    pub fn from_config(config: &AiConfig, cache: Arc<dyn Cache>) -> Result<Option<Self>, AiError> {
        if !config.enabled {
            tracing::info!("AI service disabled");
            return Ok(None);
        }

        let client: Arc<dyn AiClient> = match config.provider.as_str() {
            "deepseek" => Arc::new(DeepSeekClient::new(config)?),
            "openai" => {
                tracing::warn!("openai provider uses the DeepSeek-compatible client");
                Arc::new(DeepSeekClient::new(config)?)
            }
            other => {
                tracing::warn!(provider = other, "unknown AI provider, AI service not started");
                return Ok(None);
            }
        };

        let mut skills = SkillRegistry::new();
        if config.weather.enabled {
            let weather = WeatherSkill::new(config.weather.clone(), cache).map_err(|source| {
                AiError::Skill {
                    name: weather::SKILL_NAME.to_string(),
                    source,
                }
            })?;
            skills.register(Arc::new(weather));
            tracing::info!(provider = %config.weather.provider, "weather skill registered");
        }

        tracing::info!(provider = %config.provider, model = %config.model, "AI service ready");
        Ok(Some(Self::new(client, skills, config.system_prompt.clone())))
    }

    fn initial_messages(&self, user_message: &str) -> Vec<Message> {
        vec![
            Message::system(self.system_prompt.clone()),
            Message::user(user_message),
        ]
    }

    /// Answer `user_message`, running requested tools along the way.
    pub async fn chat(&self, user_message: &str) -> Result<String, AiError> {
        let mut messages = self.initial_messages(user_message);
        let tools = self.skills.tools();

        for _ in 0..MAX_ROUNDS {
            let response = self.client.chat(&messages, &tools).await?;
            if response.tool_calls.is_empty() {
                return Ok(response.content);
            }

            let results = self.execute_tool_calls(&response.tool_calls).await?;
            messages.push(Message::assistant(response.content, response.tool_calls));
            messages.extend(results);
        }

        Err(AiError::TooManyRounds(MAX_ROUNDS))
    }

    /// Streaming variant of [`AiService::chat`].
    ///
    /// The conversation runs in a spawned task; events arrive on the returned
    /// receiver, which closes after a `Done` or `Error` event. Dropping the
    /// receiver stops the task at its next send.
    pub fn chat_stream(self: &Arc<Self>, user_message: String) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(32);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            let event = match service.run_stream(&user_message, &tx).await {
                Ok(Some(finish_reason)) => StreamEvent::Done { finish_reason },
                Ok(None) => return,
                Err(err) => {
                    tracing::error!(error = %err, "streaming chat failed");
                    StreamEvent::Error(err.client_message())
                }
            };
            let _ = tx.send(event).await;
        });

        rx
    }

    /// Returns the final finish reason, or `None` when the subscriber left.
    async fn run_stream(
        &self,
        user_message: &str,
        tx: &mpsc::Sender<StreamEvent>,
    ) -> Result<Option<String>, AiError> {
        use futures_util::StreamExt;

        let mut messages = self.initial_messages(user_message);
        let tools = self.skills.tools();

        for _ in 0..MAX_ROUNDS {
            let mut updates = self.client.chat_stream(&messages, &tools).await?;
            let mut turn: Option<ChatResponse> = None;
            let mut streamed = String::new();

            while let Some(update) = updates.next().await {
                match update? {
                    StreamUpdate::Content(delta) => {
                        streamed.push_str(&delta);
                        if tx.send(StreamEvent::Content(delta)).await.is_err() {
                            return Ok(None);
                        }
                    }
                    StreamUpdate::Finished(response) => turn = Some(response),
                }
            }

            let turn = turn.unwrap_or_else(|| ChatResponse {
                content: streamed,
                tool_calls: Vec::new(),
                finish_reason: "stop".to_string(),
            });

            if turn.tool_calls.is_empty() {
                return Ok(Some(turn.finish_reason));
            }

            tracing::info!(count = turn.tool_calls.len(), "executing tool calls");
            if tx
                .send(StreamEvent::ToolCalls(turn.tool_calls.clone()))
                .await
                .is_err()
            {
                return Ok(None);
            }

            let results = self.execute_tool_calls(&turn.tool_calls).await?;
            messages.push(Message::assistant(turn.content, turn.tool_calls));
            messages.extend(results);
        }

        Err(AiError::TooManyRounds(MAX_ROUNDS))
    }

    async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Result<Vec<Message>, AiError> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let name = &call.function.name;
            let skill = self
                .skills
                .get(name)
                .ok_or_else(|| AiError::UnknownSkill(name.clone()))?;

            let args: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
                AiError::InvalidArguments {
                    name: name.clone(),
                    reason: e.to_string(),
                }
            })?;

            let output = skill.execute(args).await.map_err(|source| {
                tracing::error!(skill = %name, error = %source, "skill execution failed");
                AiError::Skill {
                    name: name.clone(),
                    source,
                }
            })?;

            results.push(Message::tool(call.id.clone(), output.to_string()));
        }

        Ok(results)
    }
}
