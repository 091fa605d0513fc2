//! Home content HTTP handlers (`/api/home`, authenticated).

use axum::extract::State;

use crate::{
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    models::{
        home::{CreateHomeRequest, Home, SearchQuery, UpdateHomeRequest},
        pagination::{Page, PageQuery},
    },
    response::ApiResponse,
    services::home_service,
    state::AppState,
};

/// List enabled cards.
///
/// # Endpoint
///
/// `GET /api/home/list?page=1&page_size=20`
///
/// # Response
///
/// ```json
/// {
///   "trace_id": "...",
///   "code": 0,
///   "message": "success",
///   "data": { "list": [ ... ], "total": 30, "page": 1, "page_size": 20 }
/// }
/// ```
pub async fn list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<ApiResponse<Page<Home>>, AppError> {
    let pagination = state.pagination(query.page, query.page_size);
    Ok(ApiResponse::ok(home_service::list(&state.pool, pagination).await?))
}

/// Search enabled cards by title or description.
///
/// # Endpoint
///
/// `GET /api/home/search?keyword=rust&page=1&page_size=20`
///
/// `keyword` is required, trimmed, at most 100 characters.
pub async fn search(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<ApiResponse<Page<Home>>, AppError> {
    let keyword = query.keyword()?;
    let pagination = state.pagination(query.page, query.page_size);
    let page = home_service::search(&state.pool, keyword, pagination).await?;
    Ok(ApiResponse::ok(page))
}

/// `POST /api/home/create`
pub async fn create(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateHomeRequest>,
) -> Result<ApiResponse<Home>, AppError> {
    let home = home_service::create(&state.pool, request).await?;
    Ok(ApiResponse::with_message("created", home))
}

/// Insert the demo cards.
///
/// # Endpoint
///
/// `POST /api/home/seed`
///
/// # Response
///
/// `data` is `{"count": 30}`.
pub async fn seed(State(state): State<AppState>) -> Result<ApiResponse<serde_json::Value>, AppError> {
    let count = home_service::seed(&state.pool).await?;
    Ok(ApiResponse::with_message(
        "demo data seeded",
        serde_json::json!({ "count": count }),
    ))
}

/// Partially update a card.
///
/// # Endpoint
///
/// `POST /api/home/update/{id}`
///
/// # Response
///
/// - **Success (200)**: The updated card
/// - **Error (400, 1001)**: No field provided or a field out of range
/// - **Error (404, 1004)**: No card with that id
pub async fn update(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppJson(request): AppJson<UpdateHomeRequest>,
) -> Result<ApiResponse<Home>, AppError> {
    let home = home_service::update(&state.pool, id, request).await?;
    Ok(ApiResponse::with_message("updated", home))
}

/// `DELETE /api/home/delete/{id}`
pub async fn delete(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<ApiResponse<()>, AppError> {
    home_service::delete(&state.pool, id).await?;
    Ok(ApiResponse::message("deleted"))
}
