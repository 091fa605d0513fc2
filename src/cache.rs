//! Key-value cache used for sessions and skill results.
//!
//! Services depend on the [`Cache`] trait; the server wires in
//! [`MemoryCache`], a concurrent map with per-entry expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache key must not be empty")]
    EmptyKey,

    #[error("cache backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Cache: Send + Sync {
    /// Value stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Store `value` at `key`. `ttl = None` keeps it until deleted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Session key for a user's current access token.
pub fn access_token_key(user_id: i64) -> String {
    format!("jwt:access_token:{user_id}")
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache. Expired entries are evicted lazily on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::EmptyKey);
    }
    Ok(())
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        check_key(key)?;

        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }

        // Guard dropped above; safe to take the write lock for eviction.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        check_key(key)?;

        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        check_key(key)?;
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("missing").await.unwrap(), None);
        assert!(!cache.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        cache.set("forever", "v", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("forever").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let cache = MemoryCache::new();
        cache.set("k", "old", None).await.unwrap();
        cache.set("k", "new", None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some("new".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        cache.delete("k").await.unwrap();

        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("").await.unwrap_err(), CacheError::EmptyKey);
        assert_eq!(
            cache.set("", "v", None).await.unwrap_err(),
            CacheError::EmptyKey
        );
    }

    #[tokio::test]
    async fn purge_drops_expired_entries() {
        let cache = MemoryCache::new();
        cache
            .set("a", "1", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        cache.set("b", "2", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.purge_expired();

        assert_eq!(cache.entries.len(), 1);
    }

    #[test]
    fn access_token_key_format() {
        assert_eq!(access_token_key(42), "jwt:access_token:42");
    }
}
