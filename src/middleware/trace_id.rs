//! Per-request trace id.
//!
//! Uses the caller's `X-Trace-ID` header when present, otherwise a fresh
//! UUID v4. The id is visible to the envelope builder for the whole request
//! and echoed on the response.

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::response::{generate_trace_id, with_trace_id};

pub const TRACE_ID_HEADER: HeaderName = HeaderName::from_static("x-trace-id");

/// Caller-supplied id kept for the request.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

pub async fn trace_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_trace_id);

    request.extensions_mut().insert(TraceId(id.clone()));

    let mut response = with_trace_id(id.clone(), next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}
