//! HTTP handlers for webhook management and signed callbacks.
//!
//! Every route except `/callback/{secret}` requires authentication and only
//! sees webhooks owned by the caller.

use axum::{Extension, body::Bytes, extract::State, http::HeaderMap};

use crate::{
    error::AppError,
    extract::{AppJson, AppPath},
    middleware::auth::AuthUser,
    models::webhook::{
        CreateWebhookRequest, SIGNATURE_HEADER, SignRequest, SignResponse, UpdateWebhookRequest,
        WebhookResponse, WebhookWithSecret,
    },
    response::ApiResponse,
    services::webhook_service,
    state::AppState,
};

/// Register a new webhook.
///
/// # Endpoint
///
/// `POST /api/webhook/create`
///
/// # Request Body
///
/// ```json
/// {
///   "name": "payments",
///   "callback_url": "https://example.com/hook",
///   "event": "pay-success",
///   "enabled": true          // optional, defaults to true
/// }
/// ```
///
/// # Response
///
/// The webhook plus its `secret` and `callback_path`. The secret is only
/// returned here and by the sign helper.
///
/// ```json
/// {
///   "id": 1234567890123456789,
///   "name": "payments",
///   "callback_url": "https://example.com/hook",
///   "event": "pay-success",
///   "enabled": 1,
///   "created_at": "2025-01-15 10:30:00",
///   "updated_at": "2025-01-15 10:30:00",
///   "secret": "a1b2c3d4e5f6...",
///   "callback_path": "/api/webhook/callback/a1b2c3d4e5f6..."
/// }
/// ```
pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppJson(request): AppJson<CreateWebhookRequest>,
) -> Result<ApiResponse<WebhookWithSecret>, AppError> {
    let webhook =
        webhook_service::create(&state.pool, &state.snowflake, auth.user_id, request).await?;
    Ok(ApiResponse::with_message("webhook created", webhook))
}

/// Change some fields of a webhook.
///
/// # Endpoint
///
/// `POST /api/webhook/update`
///
/// # Request Body
///
/// `id` plus any of `name`, `callback_url`, `event`, `enabled`.
pub async fn update_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppJson(request): AppJson<UpdateWebhookRequest>,
) -> Result<ApiResponse<WebhookResponse>, AppError> {
    let webhook = webhook_service::update(&state.pool, auth.user_id, request).await?;
    Ok(ApiResponse::with_message("webhook updated", webhook))
}

/// `DELETE /api/webhook/delete/{id}`
pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppPath(id): AppPath<i64>,
) -> Result<ApiResponse<()>, AppError> {
    webhook_service::delete(&state.pool, id, auth.user_id).await?;
    Ok(ApiResponse::message("webhook deleted"))
}

/// `GET /api/webhook/detail/{id}`
pub async fn webhook_detail(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppPath(id): AppPath<i64>,
) -> Result<ApiResponse<WebhookResponse>, AppError> {
    let webhook = webhook_service::detail(&state.pool, id, auth.user_id).await?;
    Ok(ApiResponse::ok(webhook))
}

/// List the caller's webhooks, newest first. Secrets are not included.
///
/// # Endpoint
///
/// `GET /api/webhook/list`
pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<Vec<WebhookResponse>>, AppError> {
    let webhooks = webhook_service::list(&state.pool, auth.user_id).await?;
    Ok(ApiResponse::ok(webhooks))
}

/// Compute the signature for a test payload.
///
/// # Endpoint
///
/// `POST /api/webhook/sign`
///
/// # Request Body
///
/// ```json
/// { "id": 1234567890123456789, "body": "{\"event\":\"pay-success\"}" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "signature": "5bdcc146...",
///   "method": "HMAC-SHA256",
///   "header": "X-Webhook-Signature",
///   "secret": "a1b2c3..."
/// }
/// ```
pub async fn sign_payload(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppJson(request): AppJson<SignRequest>,
) -> Result<ApiResponse<SignResponse>, AppError> {
    let signed = webhook_service::sign(&state.pool, auth.user_id, request).await?;
    Ok(ApiResponse::ok(signed))
}

/// Receive a signed callback.
///
/// # Endpoint
///
/// `POST /api/webhook/callback/{secret}` (public)
///
/// # Headers
///
/// `X-Webhook-Signature: <hex hmac-sha256 of the raw body>`, optionally
/// prefixed with `sha256=`.
///
/// # Response
///
/// - **Success (200)**: Envelope with message "callback processed"
/// - **Error (400, 1001)**: Missing signature header or non-JSON body
/// - **Error (401, 1002)**: Unknown or disabled webhook, bad signature
pub async fn callback(
    State(state): State<AppState>,
    AppPath(secret): AppPath<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiResponse<()>, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    webhook_service::handle_callback(&state.pool, &secret, signature, &body).await?;
    Ok(ApiResponse::message("callback processed"))
}
