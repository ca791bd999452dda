//! Response cache with group invalidation
//!
//! Cached query results are stored under a key and registered in a named
//! group (e.g. `GetLoanTransactions`). Commands evict whole groups.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use redis::{AsyncCommands, Client};

use crate::error::{AppError, AppResult};

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Store `value` under `key` and register the key in `group`
    async fn set(&self, key: &str, group: &str, value: String, ttl: Duration) -> AppResult<()>;

    /// Drop every key registered in `group`. Returns the number of keys removed.
    async fn invalidate_group(&self, group: &str) -> AppResult<usize>;
}

/// Redis-backed cache. Group membership is kept in a set per group.
#[derive(Clone)]
pub struct RedisCache {
    client: Client,
}

impl RedisCache {
    /// Create a new Redis cache and check the connection
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn group_key(group: &str) -> String {
        format!("cache-group:{}", group)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, group: &str, value: String, ttl: Duration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        conn.sadd::<_, _, ()>(Self::group_key(group), key).await?;
        Ok(())
    }

    async fn invalidate_group(&self, group: &str) -> AppResult<usize> {
        let mut conn = self.connection().await?;
        let group_key = Self::group_key(group);

        let keys: Vec<String> = conn.smembers(&group_key).await?;
        if !keys.is_empty() {
            conn.del::<_, ()>(&keys).await?;
        }
        conn.del::<_, ()>(&group_key).await?;

        Ok(keys.len())
    }
}

#[derive(Default)]
struct MemoryCacheState {
    entries: HashMap<String, (String, Instant)>,
    groups: HashMap<String, HashSet<String>>,
}

/// Process-local cache used when no Redis URL is configured
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<MemoryCacheState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, MemoryCacheState>> {
        self.state
            .lock()
            .map_err(|_| AppError::Cache("Cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut state = self.lock()?;
        match state.entries.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                state.entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, group: &str, value: String, ttl: Duration) -> AppResult<()> {
        let mut state = self.lock()?;
        state
            .entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        state
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(key.to_string());
        Ok(())
    }

    async fn invalidate_group(&self, group: &str) -> AppResult<usize> {
        let mut state = self.lock()?;
        let keys = state.groups.remove(group).unwrap_or_default();
        for key in &keys {
            state.entries.remove(key);
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_group_invalidation() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("GetListBooks(1,20)", "GetBooks", "[]".into(), ttl).await.unwrap();
        cache.set("GetListBooks(2,20)", "GetBooks", "[]".into(), ttl).await.unwrap();
        cache.set("GetListMembers(1,20)", "GetMembers", "[]".into(), ttl).await.unwrap();

        assert_eq!(cache.invalidate_group("GetBooks").await.unwrap(), 2);
        assert_eq!(cache.get("GetListBooks(1,20)").await.unwrap(), None);
        assert_eq!(
            cache.get("GetListMembers(1,20)").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped() {
        let cache = MemoryCache::new();
        cache.set("key", "group", "value".into(), Duration::ZERO).await.unwrap();
        assert_eq!(cache.get("key").await.unwrap(), None);
    }
}
