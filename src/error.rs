//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into the uniform envelope with a business code and HTTP status.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    cache::CacheError,
    jwt::TokenError,
    response::{code, envelope},
    services::ai::AiError,
    snowflake::SnowflakeError,
};

/// Application-wide error type.
///
/// # Error Categories
///
/// - **Param**: Invalid request data (1001 / 400)
/// - **Unauthorized**: Missing or bad credentials (1002 / 401)
/// - **Forbidden**: Authenticated but not allowed (1003 / 403)
/// - **NotFound**: Resource missing or not visible (1004 / 404)
/// - **MethodNotAllowed**: Known path, unsupported method (1001 / 405)
/// - **Internal causes**: Database, cache, hashing, id generation, AI upstream
///   (1005 / 500, details are logged and never returned)
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Known path, unsupported HTTP method (1001 / 405).
    #[error("{0}")]
    MethodNotAllowed(String),

    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Id generation failed: {0}")]
    IdGeneration(#[from] SnowflakeError),

    #[error("AI service error: {0}")]
    Ai(#[from] AiError),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => AppError::Internal(format!("token signing failed: {msg}")),
            other => AppError::Unauthorized(format!("token verification failed: {other}")),
        }
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("password hashing failed: {err}"))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(format!("invalid query: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(format!("invalid path parameter: {}", rejection.body_text()))
    }
}

/// Convert AppError into an HTTP response.
///
/// Client-facing variants pass their message through. Everything else is
/// logged with its cause and answered with a generic 500 envelope.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, business_code, message) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, code::PARAM_ERROR, msg.clone())
            }
            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, code::UNAUTHORIZED, msg.clone())
            }
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, code::FORBIDDEN, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, code::NOT_FOUND, msg.clone()),
            AppError::MethodNotAllowed(msg) => {
                (StatusCode::METHOD_NOT_ALLOWED, code::PARAM_ERROR, msg.clone())
            }
            AppError::Ai(err) => {
                tracing::error!(error = %err, "AI request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code::SERVER_ERROR,
                    format!("AI service call failed: {}", err.client_message()),
                )
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code::SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
        };

        envelope::<()>(status, business_code, message, None)
    }
}

/// True when `err` is a unique-constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{read_json, with_trace_id};

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = with_trace_id("t-1".to_string(), async { err.into_response() }).await;
        let status = response.status();
        (status, read_json(response).await)
    }

    #[tokio::test]
    async fn client_errors_map_to_codes() {
        let cases = [
            (AppError::invalid("bad"), StatusCode::BAD_REQUEST, 1001),
            (AppError::unauthorized("who"), StatusCode::UNAUTHORIZED, 1002),
            (AppError::forbidden("no"), StatusCode::FORBIDDEN, 1003),
            (AppError::not_found("gone"), StatusCode::NOT_FOUND, 1004),
        ];

        for (err, status, business_code) in cases {
            let message = err.to_string();
            let (got_status, body) = render(err).await;
            assert_eq!(got_status, status);
            assert_eq!(body["code"], business_code);
            assert_eq!(body["message"], message);
            assert_eq!(body["trace_id"], "t-1");
            assert!(body.get("data").is_none());
        }
    }

    #[tokio::test]
    async fn database_errors_are_hidden() {
        let (status, body) = render(AppError::Database(sqlx::Error::RowNotFound)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 1005);
        assert_eq!(body["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn provider_error_details_are_hidden() {
        let err = AiError::Api {
            status: 401,
            body: r#"{"error":"Authentication Fails, api key sk-abc invalid"}"#.to_string(),
        };
        let (status, body) = render(AppError::Ai(err)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], 1005);
        assert_eq!(body["message"], "AI service call failed: AI provider request failed");
    }

    #[tokio::test]
    async fn token_errors_are_unauthorized() {
        let (status, body) = render(TokenError::Expired.into()).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "token verification failed: token has expired");
    }
}
