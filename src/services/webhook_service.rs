//! Webhook service for managing registrations and verifying callbacks.
//!
//! This module handles webhook registration, ownership checks and HMAC
//! signature generation/verification for signed callbacks.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::{Postgres, QueryBuilder};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        flag,
        webhook::{
            CallbackEvent, CreateWebhookRequest, SIGNATURE_HEADER, SignRequest, SignResponse,
            UpdateWebhookRequest, Webhook, WebhookResponse, WebhookWithSecret,
        },
    },
    snowflake::Snowflake,
};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Register a new webhook for `user_id`.
///
/// # Process
///
/// 1. Validate name, callback URL and event
/// 2. Take an id from the snowflake generator
/// 3. Generate a cryptographically secure secret (32 bytes)
/// 4. Store the webhook and return it with its secret (only shown here)
pub async fn create(
    pool: &DbPool,
    snowflake: &Snowflake,
    user_id: i64,
    req: CreateWebhookRequest,
) -> Result<WebhookWithSecret, AppError> {
    req.validate()?;

    let id = snowflake.next_id()?;
    let secret = generate_secret();

    let webhook = sqlx::query_as::<_, Webhook>(
        r#"
        INSERT INTO webhooks (id, name, callback_url, event, secret, enabled, user_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.callback_url)
    .bind(&req.event)
    .bind(&secret)
    .bind(flag(req.enabled.unwrap_or(true)))
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    tracing::info!(webhook_id = webhook.id, user_id, "webhook created");
    Ok(webhook.into())
}

/// Load webhook `id` on behalf of `user_id`.
///
/// # Errors
///
/// - Missing or soft-deleted: `NotFound`
/// - Owned by another user: `Forbidden`
async fn find_owned(pool: &DbPool, id: i64, user_id: i64) -> Result<Webhook, AppError> {
    let webhook = sqlx::query_as::<_, Webhook>(
        "SELECT * FROM webhooks WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("webhook not found"))?;

    if webhook.user_id != user_id {
        return Err(AppError::forbidden("no permission to access this webhook"));
    }

    Ok(webhook)
}

/// Apply the provided fields. Fields left out keep their stored value.
pub async fn update(
    pool: &DbPool,
    user_id: i64,
    req: UpdateWebhookRequest,
) -> Result<WebhookResponse, AppError> {
    req.validate()?;
    find_owned(pool, req.id, user_id).await?;

    let mut query: QueryBuilder<Postgres> =
        QueryBuilder::new("UPDATE webhooks SET updated_at = NOW()");
    if let Some(name) = req.name {
        query.push(", name = ").push_bind(name);
    }
    if let Some(callback_url) = req.callback_url {
        query.push(", callback_url = ").push_bind(callback_url);
    }
    if let Some(event) = req.event {
        query.push(", event = ").push_bind(event);
    }
    if let Some(enabled) = req.enabled {
        query.push(", enabled = ").push_bind(flag(enabled));
    }
    query
        .push(" WHERE id = ")
        .push_bind(req.id)
        .push(" AND deleted_at IS NULL RETURNING *");

    let webhook = query
        .build_query_as::<Webhook>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("webhook not found"))?;

    tracing::info!(webhook_id = webhook.id, user_id, "webhook updated");
    Ok(webhook.into())
}

/// Soft delete: the row keeps its data but disappears from every lookup.
pub async fn delete(pool: &DbPool, id: i64, user_id: i64) -> Result<(), AppError> {
    find_owned(pool, id, user_id).await?;

    sqlx::query("UPDATE webhooks SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .execute(pool)
        .await?;

    tracing::info!(webhook_id = id, user_id, "webhook deleted");
    Ok(())
}

pub async fn detail(pool: &DbPool, id: i64, user_id: i64) -> Result<WebhookResponse, AppError> {
    Ok(find_owned(pool, id, user_id).await?.into())
}

/// All live webhooks of `user_id`, newest first. Secrets are not included.
pub async fn list(pool: &DbPool, user_id: i64) -> Result<Vec<WebhookResponse>, AppError> {
    let webhooks = sqlx::query_as::<_, Webhook>(
        r#"
        SELECT * FROM webhooks
        WHERE user_id = $1 AND deleted_at IS NULL
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(webhooks.into_iter().map(Into::into).collect())
}

/// Compute the signature a caller should send for `req.body`.
pub async fn sign(pool: &DbPool, user_id: i64, req: SignRequest) -> Result<SignResponse, AppError> {
    let webhook = find_owned(pool, req.id, user_id).await?;

    Ok(SignResponse {
        signature: sign_body(&webhook.secret, req.body.as_bytes()),
        method: "HMAC-SHA256",
        header: SIGNATURE_HEADER,
        secret: webhook.secret,
    })
}

/// Verify and dispatch a callback posted to `/api/webhook/callback/{secret}`.
///
/// # Errors
///
/// - Missing signature header: `InvalidRequest`
/// - Unknown, deleted or disabled webhook, or a bad signature: `Unauthorized`
/// - Body is not JSON: `InvalidRequest`
pub async fn handle_callback(
    pool: &DbPool,
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<CallbackEvent, AppError> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::invalid(format!("missing {SIGNATURE_HEADER} header")))?;

    let webhook = sqlx::query_as::<_, Webhook>(
        "SELECT * FROM webhooks WHERE secret = $1 AND enabled = 1 AND deleted_at IS NULL",
    )
    .bind(secret)
    .fetch_optional(pool)
    .await?;

    let Some(webhook) = webhook else {
        tracing::warn!("callback for unknown or disabled webhook");
        return Err(AppError::unauthorized("signature verification failed"));
    };

    if !verify_signature(&webhook.secret, body, signature) {
        tracing::warn!(webhook_id = webhook.id, "callback signature mismatch");
        return Err(AppError::unauthorized("signature verification failed"));
    }

    let payload: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::invalid(format!("callback body must be JSON: {e}")))?;

    let event = CallbackEvent::from_payload(&payload);
    match &event {
        CallbackEvent::PaySuccess { order_id } => {
            tracing::info!(webhook_id = webhook.id, order_id = ?order_id, "payment success event received");
        }
        CallbackEvent::Unknown(name) => {
            tracing::info!(webhook_id = webhook.id, event = %name, "unknown callback event received");
        }
    }

    Ok(event)
}

fn mac(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature, optionally prefixed `sha256=`.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let hex_digest = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = mac(secret);
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// 64 hex characters (32 random bytes).
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing;

    const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    const BODY: &[u8] = br#"{"event":"pay-success","data":{"order_id":"A-1"}}"#;

    #[test]
    fn generated_secrets_are_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }

    #[test]
    fn known_hmac_vector() {
        // RFC 4231 test case 2
        let mut mac = mac("Jefe");
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert_eq!(
            sign_body("Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn correct_signature_verifies_with_or_without_prefix() {
        let signature = sign_body(SECRET, BODY);

        assert!(verify_signature(SECRET, BODY, &signature));
        assert!(verify_signature(SECRET, BODY, &format!("sha256={signature}")));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let signature = sign_body(SECRET, BODY);

        assert!(!verify_signature(SECRET, b"{\"event\":\"refund\"}", &signature));
        assert!(!verify_signature("other-secret", BODY, &signature));
    }

    #[test]
    fn non_hex_signature_fails() {
        assert!(!verify_signature(SECRET, BODY, "not-hex"));
        assert!(!verify_signature(SECRET, BODY, ""));
    }

    #[tokio::test]
    async fn missing_signature_header_is_a_param_error() {
        let state = testing::state();

        let err = handle_callback(&state.pool, SECRET, None, BODY)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));

        let err = handle_callback(&state.pool, SECRET, Some("  "), BODY)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn invalid_create_request_fails_before_sql() {
        let state = testing::state();
        let req = CreateWebhookRequest {
            name: String::new(),
            callback_url: "https://example.com".to_string(),
            event: "pay-success".to_string(),
            enabled: None,
        };

        let err = create(&state.pool, &state.snowflake, 1, req).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
