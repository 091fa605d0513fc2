//! Webhook models for endpoint registration and signed callbacks.
//!
//! # Webhook Flow
//!
//! 1. A user registers a webhook via `POST /api/webhook/create`
//! 2. The system generates a secret and returns the callback path
//!    `/api/webhook/callback/{secret}`
//! 3. The caller signs each request body with HMAC-SHA256 using the secret
//!    and sends the hex digest in `X-Webhook-Signature`
//! 4. The server verifies the signature and dispatches the event
//!
//! # Security
//!
//! - Secrets are only shown in the create response and by the sign helper
//! - Signatures are compared in constant time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{check_len, check_opt_len};
use crate::error::AppError;

/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Format used for webhook timestamps in responses.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Webhook registered by a user.
///
/// # Database Table
///
/// Maps to the `webhooks` table. `id` comes from the snowflake generator.
/// Rows with `deleted_at` set are treated as absent.
#[derive(Debug, Clone, FromRow)]
pub struct Webhook {
    pub id: i64,
    pub name: String,
    pub callback_url: String,
    pub event: String,
    pub secret: String,
    pub enabled: i16,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Webhook {
    pub fn is_enabled(&self) -> bool {
        self.enabled == 1
    }

    /// Public path callers post signed events to.
    pub fn callback_path(&self) -> String {
        format!("/api/webhook/callback/{}", self.secret)
    }
}

/// Request to register a new webhook.
///
/// # Example
///
/// ```json
/// {
///   "name": "payments",
///   "callback_url": "https://example.com/hooks/pay",
///   "event": "pay-success"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub name: String,
    pub callback_url: String,
    pub event: String,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl CreateWebhookRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        check_len("name", &self.name, 1, 100)?;
        validate_callback_url(&self.callback_url)?;
        check_len("event", &self.event, 1, 100)
    }
}

/// Partial update; only provided fields change.
#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl UpdateWebhookRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.is_none()
            && self.callback_url.is_none()
            && self.event.is_none()
            && self.enabled.is_none()
        {
            return Err(AppError::invalid("no fields to update"));
        }

        check_opt_len("name", self.name.as_deref(), 1, 100)?;
        if let Some(url) = &self.callback_url {
            validate_callback_url(url)?;
        }
        check_opt_len("event", self.event.as_deref(), 1, 100)
    }
}

/// Request to compute the signature of a body with a webhook's secret.
#[derive(Debug, Deserialize)]
pub struct SignRequest {
    pub id: i64,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub signature: String,
    pub method: &'static str,
    pub header: &'static str,
    pub secret: String,
}

/// Webhook as returned by detail/list/update. Never contains the secret.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: i64,
    pub name: String,
    pub callback_url: String,
    pub event: String,
    pub enabled: i16,
    pub user_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        Self {
            id: webhook.id,
            name: webhook.name,
            callback_url: webhook.callback_url,
            event: webhook.event,
            enabled: webhook.enabled,
            user_id: webhook.user_id,
            created_at: webhook.created_at.format(TIMESTAMP_FORMAT).to_string(),
            updated_at: webhook.updated_at.format(TIMESTAMP_FORMAT).to_string(),
        }
    }
}

/// Create response: the only place the secret is returned with the webhook.
#[derive(Debug, Serialize)]
pub struct WebhookWithSecret {
    #[serde(flatten)]
    pub webhook: WebhookResponse,
    pub secret: String,
    pub callback_path: String,
}

impl From<Webhook> for WebhookWithSecret {
    fn from(webhook: Webhook) -> Self {
        let secret = webhook.secret.clone();
        let callback_path = webhook.callback_path();
        Self {
            webhook: webhook.into(),
            secret,
            callback_path,
        }
    }
}

/// Event carried in a verified callback body.
#[derive(Debug, PartialEq)]
pub enum CallbackEvent {
    PaySuccess { order_id: Option<serde_json::Value> },
    Unknown(String),
}

impl CallbackEvent {
    pub const PAY_SUCCESS: &'static str = "pay-success";

    /// Interpret `{"event": "...", "data": {...}}`.
    pub fn from_payload(payload: &serde_json::Value) -> Self {
        let event = payload
            .get("event")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default();

        match event {
            Self::PAY_SUCCESS => CallbackEvent::PaySuccess {
                order_id: payload.pointer("/data/order_id").cloned(),
            },
            other => CallbackEvent::Unknown(other.to_string()),
        }
    }
}

fn validate_callback_url(raw: &str) -> Result<(), AppError> {
    check_len("callback_url", raw, 1, 500)?;

    let url = url::Url::parse(raw).map_err(|_| AppError::invalid("callback_url is not a valid URL"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(AppError::invalid("callback_url must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(AppError::invalid("callback_url must have a host"));
    }
    Ok(())
}
