//! AI chat handlers. Mounted only when the AI service is configured.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    error::AppError,
    extract::AppJson,
    models::check_len,
    response::ApiResponse,
    services::ai::{AiService, StreamEvent},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    fn validate(&self) -> Result<(), AppError> {
        check_len("message", self.message.trim(), 1, 4000)
    }
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

fn service(state: &AppState) -> Result<Arc<AiService>, AppError> {
    state
        .ai
        .clone()
        .ok_or_else(|| AppError::Internal("AI service is not configured".to_string()))
}

/// One-shot chat.
///
/// # Endpoint
///
/// `POST /api/ai/chat`
///
/// # Request Body
///
/// ```json
/// { "message": "What's the weather in Beijing?" }
/// ```
///
/// # Response
///
/// `data` is `{"reply": "..."}`. Provider or skill failures answer 500 with
/// code 1005.
pub async fn chat(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<ApiResponse<ChatReply>, AppError> {
    request.validate()?;
    let ai = service(&state)?;

    let reply = ai.chat(&request.message).await?;
    Ok(ApiResponse::ok(ChatReply { reply }))
}

fn to_sse(event: StreamEvent) -> Result<Event, Infallible> {
    let name = event.name();
    Ok(match Event::default().event(name).json_data(event.payload()) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!(error = %e, event = name, "failed to encode stream event");
            Event::default().event(name).data("{}")
        }
    })
}

/// Streaming chat over server-sent events.
///
/// # Endpoint
///
/// `POST /api/ai/chat2`
///
/// # Events
///
/// - `message`: `{"content": "..."}` for each content delta
/// - `tool_calls`: `{"tool_calls": [...]}` before skills run
/// - `done`: `{"finish_reason": "stop"}`
/// - `error`: `{"message": "..."}`
pub async fn chat_stream(
    State(state): State<AppState>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    request.validate()?;
    let ai = service(&state)?;

    let events = ReceiverStream::new(ai.chat_stream(request.message)).map(to_sse);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
