//! Database connection pool and migration management.
//!
//! This module provides utilities for:
//! - Creating and managing a PostgreSQL connection pool
//! - Running database migrations automatically

use sqlx::{Pool, Postgres, postgres::PgPoolOptions};

/// Type alias for PostgreSQL connection pool.
pub type DbPool = Pool<Postgres>;

/// Create a new PostgreSQL connection pool.
///
/// # Arguments
///
/// * `database_url` - PostgreSQL connection string
/// * `max_connections` - Upper bound on pooled connections (`DATABASE_MAX_CONNECTIONS`)
///
/// # Errors
///
/// Returns an error if:
/// - Database connection string is invalid
/// - Cannot connect to PostgreSQL server
/// - Database authentication fails
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Pool that opens connections on first use. Only the URL is validated here.
#[cfg(test)]
pub fn connect_lazy(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect_lazy(database_url)
}

/// Run database migrations from the `migrations/` directory.
///
/// Migrations are tracked in the `_sqlx_migrations` table, so each one runs
/// only once.
///
/// # Errors
///
/// Returns an error if:
/// - SQL syntax errors in migration files
/// - Database errors during migration execution
/// - An applied migration was modified after it ran
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    const USERS_MIGRATION: &str = include_str!("../migrations/20260101000001_create_users.sql");

    fn unique_index_on(column: &str) -> &'static str {
        USERS_MIGRATION
            .lines()
            .find(|line| line.starts_with("CREATE UNIQUE INDEX") && line.contains(column))
            .unwrap()
    }

    #[test]
    fn soft_deleted_users_release_username_and_email() {
        assert!(unique_index_on("(username)").ends_with("WHERE deleted_at IS NULL;"));
        assert!(unique_index_on("(email)").contains("deleted_at IS NULL"));
    }
}
