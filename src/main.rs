//! Content Hub - Main Application Entry Point
//!
//! A REST backend providing user accounts, home page content, signed
//! webhooks and an optional AI chat assistant with a weather skill.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server, SSE for streaming chat)
//! - **Database**: PostgreSQL with sqlx (async queries, migrations)
//! - **Authentication**: JWT (HS256) with a cached live session per user
//! - **Format**: JSON envelope `{trace_id, code, message, data}`
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Initialize logging (`LOG_FORMAT=json|pretty`, `RUST_LOG`)
//! 3. Create database connection pool and run migrations
//! 4. Build cache, JWT manager, id generator and the optional AI service
//! 5. Build HTTP router with routes and middleware
//! 6. Start server on configured port

mod cache;
mod config;
mod db;
mod error;
mod extract;
mod handlers;
mod jwt;
mod middleware;
mod models;
mod response;
mod router;
mod services;
mod snowflake;
mod state;

use std::{sync::Arc, time::Duration};

use tracing_subscriber::EnvFilter;

use crate::{
    cache::MemoryCache, jwt::JwtManager, services::ai::AiService, snowflake::Snowflake,
    state::AppState,
};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn init_logging(format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;
    init_logging(&config.log_format);
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let memory_cache = Arc::new(MemoryCache::new());
    let purge_cache = memory_cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CACHE_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            purge_cache.purge_expired();
        }
    });

    let ai = AiService::from_config(&config.ai, memory_cache.clone())?.map(Arc::new);

    let state = AppState {
        pool,
        cache: memory_cache,
        jwt: Arc::new(JwtManager::new(&config.jwt)),
        snowflake: Arc::new(Snowflake::new(config.snowflake_machine_id)?),
        config: Arc::new(config),
        ai,
    };

    let addr = format!("0.0.0.0:{}", state.config.server_port);
    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
