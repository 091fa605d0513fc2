//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::{
    cache::Cache, config::Config, db::DbPool, jwt::JwtManager, models::pagination::Pagination,
    services::ai::AiService, snowflake::Snowflake,
};

/// Cheap to clone: everything is behind an `Arc` or is a pool handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub cache: Arc<dyn Cache>,
    pub jwt: Arc<JwtManager>,
    pub snowflake: Arc<Snowflake>,
    pub config: Arc<Config>,
    /// Present only when the AI service is enabled and configured.
    pub ai: Option<Arc<AiService>>,
}

impl AppState {
    /// Normalize raw paging input with the configured bounds.
    pub fn pagination(&self, page: Option<i64>, page_size: Option<i64>) -> Pagination {
        Pagination::new(
            page,
            page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::cache::MemoryCache;

    /// State with a lazily connected pool; only SQL-free paths may be exercised.
    pub fn state() -> AppState {
        state_with_ai(None)
    }

    pub fn state_with_ai(ai: Option<Arc<AiService>>) -> AppState {
        let config = Config::for_tests();
        AppState {
            pool: crate::db::connect_lazy(&config.database_url, 1)
                .expect("lazy pool from a valid url"),
            cache: Arc::new(MemoryCache::new()),
            jwt: Arc::new(JwtManager::new(&config.jwt)),
            snowflake: Arc::new(Snowflake::new(config.snowflake_machine_id).expect("valid id")),
            config: Arc::new(config),
            ai,
        }
    }
}
