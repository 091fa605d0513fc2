//! Home content service.
//!
//! Public listings only show enabled cards (`status = 1`), ordered by
//! `sort ASC, id DESC`.

use sqlx::{Postgres, QueryBuilder};

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        home::{
            CreateHomeRequest, Home, SEED_COUNT, STATUS_ENABLED, UpdateHomeRequest, like_pattern,
            seed_card,
        },
        pagination::{Page, Pagination},
    },
};

pub async fn list(pool: &DbPool, pagination: Pagination) -> Result<Page<Home>, AppError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM home WHERE status = $1")
        .bind(STATUS_ENABLED)
        .fetch_one(pool)
        .await?;

    let items = sqlx::query_as::<_, Home>(
        r#"
        SELECT * FROM home
        WHERE status = $1
        ORDER BY sort ASC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(STATUS_ENABLED)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, total, pagination))
}

/// Case-insensitive search over title and description.
///
/// `keyword` is matched literally: LIKE wildcards in it are escaped.
pub async fn search(
    pool: &DbPool,
    keyword: &str,
    pagination: Pagination,
) -> Result<Page<Home>, AppError> {
    let pattern = like_pattern(keyword);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM home
        WHERE status = $1 AND (title ILIKE $2 OR description ILIKE $2)
        "#,
    )
    .bind(STATUS_ENABLED)
    .bind(&pattern)
    .fetch_one(pool)
    .await?;

    let items = sqlx::query_as::<_, Home>(
        r#"
        SELECT * FROM home
        WHERE status = $1 AND (title ILIKE $2 OR description ILIKE $2)
        ORDER BY sort ASC, id DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(STATUS_ENABLED)
    .bind(&pattern)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(pool)
    .await?;

    Ok(Page::new(items, total, pagination))
}

async fn insert<'e, E>(executor: E, req: &CreateHomeRequest) -> Result<Home, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query_as::<_, Home>(
        r#"
        INSERT INTO home (title, description, image_url, link, sort, status)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(req.title.trim())
    .bind(req.description.as_deref().unwrap_or_default())
    .bind(req.image_url.as_deref().unwrap_or_default())
    .bind(req.link.as_deref().unwrap_or_default())
    .bind(req.sort.unwrap_or(0))
    .bind(req.status.unwrap_or(STATUS_ENABLED))
    .fetch_one(executor)
    .await
}

pub async fn create(pool: &DbPool, req: CreateHomeRequest) -> Result<Home, AppError> {
    req.validate()?;

    let home = insert(pool, &req).await?;
    tracing::info!(home_id = home.id, "home content created");
    Ok(home)
}

/// Insert the demo cards in one transaction. Returns how many were inserted.
pub async fn seed(pool: &DbPool) -> Result<i32, AppError> {
    let mut tx = pool.begin().await?;
    for n in 1..=SEED_COUNT {
        insert(&mut *tx, &seed_card(n)).await?;
    }
    tx.commit().await?;

    tracing::info!(count = SEED_COUNT, "home demo content seeded");
    Ok(SEED_COUNT)
}

/// Apply the provided fields to card `id`.
pub async fn update(pool: &DbPool, id: i64, req: UpdateHomeRequest) -> Result<Home, AppError> {
    req.validate()?;

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE home SET updated_at = NOW()");
    if let Some(title) = req.title {
        query.push(", title = ").push_bind(title.trim().to_string());
    }
    if let Some(description) = req.description {
        query.push(", description = ").push_bind(description);
    }
    if let Some(image_url) = req.image_url {
        query.push(", image_url = ").push_bind(image_url);
    }
    if let Some(link) = req.link {
        query.push(", link = ").push_bind(link);
    }
    if let Some(sort) = req.sort {
        query.push(", sort = ").push_bind(sort);
    }
    if let Some(status) = req.status {
        query.push(", status = ").push_bind(status);
    }
    query.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

    let home = query
        .build_query_as::<Home>()
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("home content not found"))?;

    tracing::info!(home_id = id, "home content updated");
    Ok(home)
}

pub async fn delete(pool: &DbPool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM home WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("home content not found"));
    }

    tracing::info!(home_id = id, "home content deleted");
    Ok(())
}
