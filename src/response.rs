//! Uniform JSON response envelope.
//!
//! Every JSON endpoint (except `/health`) answers with:
//!
//! ```json
//! {
//!   "trace_id": "0b6f0f0e-...",
//!   "code": 0,
//!   "message": "success",
//!   "data": { ... }
//! }
//! ```
//!
//! `data` is omitted when there is nothing to return. The trace id is the
//! one assigned by the trace-id middleware for the current request.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use uuid::Uuid;

/// Business status codes carried in the `code` field.
pub mod code {
    pub const SUCCESS: i32 = 0;
    pub const PARAM_ERROR: i32 = 1001;
    pub const UNAUTHORIZED: i32 = 1002;
    pub const FORBIDDEN: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const SERVER_ERROR: i32 = 1005;
}

tokio::task_local! {
    static TRACE_ID: String;
}

/// Run `fut` with `trace_id` visible to [`current_trace_id`].
pub async fn with_trace_id<F: std::future::Future>(trace_id: String, fut: F) -> F::Output {
    TRACE_ID.scope(trace_id, fut).await
}

/// Trace id of the request being served, or a fresh one outside a request.
pub fn current_trace_id() -> String {
    TRACE_ID
        .try_with(|id| id.clone())
        .unwrap_or_else(|_| generate_trace_id())
}

pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub trace_id: String,
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// Build an envelope response with an explicit HTTP status.
pub fn envelope<T: Serialize>(
    status: StatusCode,
    code: i32,
    message: impl Into<String>,
    data: Option<T>,
) -> Response {
    let body = Envelope {
        trace_id: current_trace_id(),
        code,
        message: message.into(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Successful handler result.
pub struct ApiResponse<T> {
    message: String,
    data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    /// Success without a `data` field.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        envelope(StatusCode::OK, code::SUCCESS, self.message, self.data)
    }
}

#[cfg(test)]
pub(crate) async fn read_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
