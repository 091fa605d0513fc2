//! User account HTTP handlers.
//!
//! Routes under `/api/user`:
//! - POST /login, /register, /refresh (public)
//! - GET/PUT /profile, POST /change-password, POST /logout (authenticated)
//! - GET /admin/list (admin only)

use axum::{Extension, extract::State};

use crate::{
    error::AppError,
    extract::{AppJson, AppQuery},
    middleware::auth::AuthUser,
    models::{
        pagination::{Page, PageQuery},
        user::{
            ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest,
            TokenResponse, UpdateProfileRequest, User,
        },
    },
    response::ApiResponse,
    services::auth_service,
    state::AppState,
};

/// Log in with username and password.
///
/// # Endpoint
///
/// `POST /api/user/login`
///
/// # Request Body
///
/// ```json
/// { "username": "alice", "password": "secret123" }
/// ```
///
/// # Response
///
/// - **Success (200)**: `{user, access_token, refresh_token, expires_in}`
/// - **Error (401, 1002)**: Unknown user, wrong password or disabled user
pub async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, AppError> {
    let response = auth_service::login(&state, request).await?;
    Ok(ApiResponse::with_message("login successful", response))
}

/// Create an account.
///
/// # Endpoint
///
/// `POST /api/user/register`
///
/// # Request Body
///
/// ```json
/// {
///   "username": "alice",
///   "password": "secret123",
///   "email": "alice@example.com",   // optional
///   "phone": "13800000000",         // optional, 11 characters
///   "nickname": "Alice"             // optional
/// }
/// ```
///
/// # Response
///
/// - **Success (200)**: The new user (no password hash)
/// - **Error (400, 1001)**: Invalid fields, username or email taken
pub async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let user = auth_service::register(&state.pool, request).await?;
    Ok(ApiResponse::with_message("registration successful", user))
}

/// Exchange a refresh token for a new token pair.
///
/// # Endpoint
///
/// `POST /api/user/refresh`
pub async fn refresh(
    State(state): State<AppState>,
    AppJson(request): AppJson<RefreshRequest>,
) -> Result<ApiResponse<TokenResponse>, AppError> {
    let tokens = auth_service::refresh(&state, request).await?;
    Ok(ApiResponse::ok(tokens))
}

/// `GET /api/user/profile`
pub async fn profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<User>, AppError> {
    let user = auth_service::profile(&state.pool, auth.user_id).await?;
    Ok(ApiResponse::ok(user))
}

/// Update the caller's profile.
///
/// # Endpoint
///
/// `PUT /api/user/profile`
///
/// # Request Body
///
/// Any of `email`, `phone`, `nickname`, `avatar`. At least one is required;
/// an empty `email` or `phone` clears it.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppJson(request): AppJson<UpdateProfileRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let user = auth_service::update_profile(&state.pool, auth.user_id, request).await?;
    Ok(ApiResponse::with_message("profile updated", user))
}

/// Change password. The current session is revoked on success.
///
/// # Endpoint
///
/// `POST /api/user/change-password`
pub async fn change_password(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
    AppJson(request): AppJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    auth_service::change_password(&state, auth.user_id, request).await?;
    Ok(ApiResponse::message("password changed, please log in again"))
}

/// `POST /api/user/logout`
pub async fn logout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<()>, AppError> {
    auth_service::logout(&state, auth.user_id).await?;
    Ok(ApiResponse::message("logged out"))
}

/// Paginated user list for administrators.
///
/// # Endpoint
///
/// `GET /api/user/admin/list?page=1&page_size=20`
///
/// # Response
///
/// - **Success (200)**: `{list, total, page, page_size}`
/// - **Error (403, 1003)**: Caller lacks the `admin` role
pub async fn admin_list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<ApiResponse<Page<User>>, AppError> {
    let pagination = state.pagination(query.page, query.page_size);
    let page = auth_service::list_users(&state.pool, pagination).await?;
    Ok(ApiResponse::ok(page))
}
