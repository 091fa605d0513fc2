//! JWT authentication middleware and role guard.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the token from the `Authorization: Bearer <token>` header
//! 2. Verify signature, issuer, expiry and token type
//! 3. Optionally check it is still the user's live session in the cache
//! 4. Inject [`AuthUser`] into the request extensions

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{
    cache::access_token_key, error::AppError, jwt::TokenType, models::user::ROLE_ADMIN,
    state::AppState,
};

/// Authenticated caller attached to protected requests.
///
/// Handlers read it with `Extension<AuthUser>`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_any_role(&self, roles: &[&str]) -> bool {
        self.roles.iter().any(|r| roles.contains(&r.as_str()))
    }
}

/// `Bearer <token>` → `<token>`.
fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("authorization header must be 'Bearer <token>'"))
}

/// JWT authentication middleware function.
///
/// # Flow
///
/// 1. Parse the bearer token (missing or malformed header: 401)
/// 2. Verify it as an access token (invalid, expired or refresh token: 401)
/// 3. With `SESSION_CHECK` on, compare it with `jwt:access_token:{user_id}`:
///    absent means logged out or expired, different means superseded
/// 4. Insert [`AuthUser`] and call the next handler
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;
    let claims = state.jwt.parse_typed(token, TokenType::Access)?;
    let user_id = claims.user_id()?;

    if state.config.session_check {
        let cached = state.cache.get(&access_token_key(user_id)).await.map_err(|e| {
            tracing::warn!(user_id, error = %e, "session lookup failed");
            AppError::unauthorized("failed to verify session")
        })?;

        match cached {
            None => return Err(AppError::unauthorized("token expired, please log in again")),
            Some(current) if current != token => {
                return Err(AppError::unauthorized("token is no longer valid"));
            }
            Some(_) => {}
        }
    }

    request.extensions_mut().insert(AuthUser {
        user_id,
        username: claims.username,
        roles: claims.roles,
    });

    Ok(next.run(request).await)
}

/// Role guard for admin-only routes. Must run after [`jwt_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or_else(|| AppError::unauthorized("authentication required"))?;

    if !user.has_any_role(&[ROLE_ADMIN]) {
        tracing::info!(user_id = user.user_id, "admin route denied");
        return Err(AppError::forbidden("insufficient permissions"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_matching() {
        let user = AuthUser {
            user_id: 1,
            username: "alice".to_string(),
            roles: vec!["user".to_string()],
        };

        assert!(user.has_any_role(&["admin", "user"]));
        assert!(!user.has_any_role(&[ROLE_ADMIN]));
        assert!(!user.has_any_role(&[]));
    }
}
