//! Account service: registration, login, token refresh and profile changes.
//!
//! Passwords are hashed with bcrypt on the blocking thread pool. The current
//! access token of each user is stored in the cache under
//! `jwt:access_token:{user_id}`; the auth middleware compares against it when
//! session checking is enabled, so overwriting or deleting that key revokes
//! older tokens.

use std::time::Duration;

use sqlx::{Postgres, QueryBuilder};

use crate::{
    cache::access_token_key,
    db::DbPool,
    error::{AppError, is_unique_violation},
    jwt::TokenType,
    models::{
        pagination::{Page, Pagination},
        user::{
            ChangePasswordRequest, LoginRequest, LoginResponse, ROLE_USER, RefreshRequest,
            RegisterRequest, STATUS_ACTIVE, TokenResponse, UpdateProfileRequest, User,
        },
    },
    state::AppState,
};

const INVALID_CREDENTIALS: &str = "invalid username or password";

/// Hash `password` with bcrypt off the async executor.
pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(AppError::from)
}

/// Check `password` against a bcrypt hash off the async executor.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(AppError::from)
}

async fn find_by_username(pool: &DbPool, username: &str) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE username = $1 AND deleted_at IS NULL",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Fetch a live (not soft-deleted) user.
pub async fn find_user(pool: &DbPool, user_id: i64) -> Result<Option<User>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND deleted_at IS NULL")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

async fn email_taken(pool: &DbPool, email: &str, except_user: Option<i64>) -> Result<bool, AppError> {
    let taken: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM users
            WHERE email = $1 AND deleted_at IS NULL AND ($2::BIGINT IS NULL OR id <> $2)
        )
        "#,
    )
    .bind(email)
    .bind(except_user)
    .fetch_one(pool)
    .await?;
    Ok(taken)
}

/// Issue a token pair for `user` and make its access token the live session.
async fn start_session(state: &AppState, user: &User) -> Result<TokenResponse, AppError> {
    let pair = state
        .jwt
        .generate_token_pair(user.id, &user.username, &user.roles())?;

    let ttl = Duration::from_secs(state.config.jwt.access_token_duration);
    state
        .cache
        .set(&access_token_key(user.id), &pair.access_token, Some(ttl))
        .await?;

    Ok(TokenResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        expires_in: state.jwt.access_ttl(),
    })
}

/// Authenticate with username and password.
///
/// # Errors
///
/// - Unknown user or wrong password: `Unauthorized` with one shared message
/// - Disabled user: `Unauthorized("user is disabled")`
pub async fn login(state: &AppState, req: LoginRequest) -> Result<LoginResponse, AppError> {
    req.validate()?;

    let user = find_by_username(&state.pool, &req.username)
        .await?
        .ok_or_else(|| AppError::unauthorized(INVALID_CREDENTIALS))?;

    authenticate(state, user, req.password).await
}

/// Check `password` against a stored user and open a session for it.
async fn authenticate(
    state: &AppState,
    user: User,
    password: String,
) -> Result<LoginResponse, AppError> {
    if !verify_password(password, user.password_hash.clone()).await? {
        tracing::info!(username = %user.username, "login rejected: wrong password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    if !user.is_active() {
        return Err(AppError::unauthorized("user is disabled"));
    }

    let tokens = start_session(state, &user).await?;
    tracing::info!(user_id = user.id, "user logged in");

    Ok(LoginResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
    })
}

/// Create a new account with the `user` role.
pub async fn register(pool: &DbPool, req: RegisterRequest) -> Result<User, AppError> {
    let req = req.validate()?;

    if find_by_username(pool, &req.username).await?.is_some() {
        return Err(AppError::invalid("username already exists"));
    }
    if let Some(email) = &req.email {
        if email_taken(pool, email, None).await? {
            return Err(AppError::invalid("email already registered"));
        }
    }

    let password_hash = hash_password(req.password).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (username, password_hash, email, phone, nickname, role, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(&req.username)
    .bind(&password_hash)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.nickname)
    .bind(ROLE_USER)
    .bind(STATUS_ACTIVE)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::invalid("username or email already exists")
        } else {
            AppError::from(e)
        }
    })?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Exchange a refresh token for a new pair.
///
/// The user must still exist and be active. The new access token replaces
/// the cached session.
pub async fn refresh(state: &AppState, req: RefreshRequest) -> Result<TokenResponse, AppError> {
    if req.refresh_token.is_empty() {
        return Err(AppError::invalid("refresh_token is required"));
    }

    let claims = state.jwt.parse_typed(&req.refresh_token, TokenType::Refresh)?;
    let user_id = claims.user_id()?;

    let user = find_user(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("user no longer exists"))?;
    if !user.is_active() {
        return Err(AppError::unauthorized("user is disabled"));
    }

    let tokens = start_session(state, &user).await?;
    tracing::info!(user_id, "tokens refreshed");
    Ok(tokens)
}

pub async fn profile(pool: &DbPool, user_id: i64) -> Result<User, AppError> {
    find_user(pool, user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// Update the caller's own profile. Empty email/phone clear the field.
pub async fn update_profile(
    pool: &DbPool,
    user_id: i64,
    req: UpdateProfileRequest,
) -> Result<User, AppError> {
    req.validate()?;

    if let Some(email) = req.email.as_deref().filter(|e| !e.is_empty()) {
        if email_taken(pool, email, Some(user_id)).await? {
            return Err(AppError::invalid("email already registered"));
        }
    }

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET updated_at = NOW()");
    if let Some(email) = req.email {
        query.push(", email = ").push_bind(Some(email).filter(|e| !e.is_empty()));
    }
    if let Some(phone) = req.phone {
        query.push(", phone = ").push_bind(Some(phone).filter(|p| !p.is_empty()));
    }
    if let Some(nickname) = req.nickname {
        query.push(", nickname = ").push_bind(nickname);
    }
    if let Some(avatar) = req.avatar {
        query.push(", avatar = ").push_bind(avatar);
    }
    query
        .push(" WHERE id = ")
        .push_bind(user_id)
        .push(" AND deleted_at IS NULL RETURNING *");

    let user = query
        .build_query_as::<User>()
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::invalid("email already registered")
            } else {
                AppError::from(e)
            }
        })?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    tracing::info!(user_id, "profile updated");
    Ok(user)
}

/// Change the password and revoke the current session.
pub async fn change_password(
    state: &AppState,
    user_id: i64,
    req: ChangePasswordRequest,
) -> Result<(), AppError> {
    req.validate()?;

    let user = profile(&state.pool, user_id).await?;
    if !verify_password(req.old_password, user.password_hash).await? {
        return Err(AppError::invalid("old password is incorrect"));
    }

    let password_hash = hash_password(req.new_password).await?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
        .bind(&password_hash)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    state.cache.delete(&access_token_key(user_id)).await?;
    tracing::info!(user_id, "password changed, session revoked");
    Ok(())
}

/// Drop the cached session so the current access token stops working.
pub async fn logout(state: &AppState, user_id: i64) -> Result<(), AppError> {
    state.cache.delete(&access_token_key(user_id)).await?;
    tracing::info!(user_id, "user logged out");
    Ok(())
}

/// Paginated list of live users, newest first.
pub async fn list_users(pool: &DbPool, pagination: Pagination) -> Result<Page<User>, AppError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
        .fetch_one(pool)
        .await?;

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT * FROM users
        WHERE deleted_at IS NULL
        ORDER BY id DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(users, total, pagination))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::state::testing;

    async fn stored_user(status: i16) -> User {
        User {
            id: 42,
            username: "alice".to_string(),
            password_hash: hash_password("secret123".to_string()).await.unwrap(),
            email: None,
            phone: None,
            nickname: None,
            avatar: None,
            role: ROLE_USER.to_string(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn wrong_password_is_rejected_without_a_session() {
        let state = testing::state();
        let user = stored_user(STATUS_ACTIVE).await;

        let err = authenticate(&state, user, "wrong-pass".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(ref m) if m == INVALID_CREDENTIALS));
        assert!(!state.cache.exists(&access_token_key(42)).await.unwrap());
    }

    #[tokio::test]
    async fn disabled_user_is_rejected() {
        let state = testing::state();
        let user = stored_user(0).await;

        let err = authenticate(&state, user, "secret123".to_string())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "user is disabled"));
    }

    #[tokio::test]
    async fn correct_password_opens_a_session() {
        let state = testing::state();
        let user = stored_user(STATUS_ACTIVE).await;

        let response = authenticate(&state, user, "secret123".to_string())
            .await
            .unwrap();

        assert_eq!(response.user.id, 42);
        let live = state.cache.get(&access_token_key(42)).await.unwrap();
        assert_eq!(live.as_deref(), Some(response.access_token.as_str()));
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let hash = hash_password("secret123".to_string()).await.unwrap();

        assert_ne!(hash, "secret123");
        assert!(verify_password("secret123".to_string(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong-pass".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn logout_removes_session() {
        let state = testing::state();
        let key = access_token_key(5);
        state.cache.set(&key, "token", None).await.unwrap();

        logout(&state, 5).await.unwrap();

        assert!(!state.cache.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_before_touching_the_database() {
        let state = testing::state();
        let pair = state
            .jwt
            .generate_token_pair(1, "alice", &["user".to_string()])
            .unwrap();

        let err = refresh(
            &state,
            RefreshRequest {
                refresh_token: pair.access_token,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn login_validates_input_first() {
        let state = testing::state();
        let err = login(
            &state,
            LoginRequest {
                username: "al".to_string(),
                password: "secret123".to_string(),
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
