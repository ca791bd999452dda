//! Per-operation interceptor chain
//!
//! Every use case is described by an [`Operation`] and executed through
//! [`Pipeline::run`], which applies in order: authorization, cache lookup,
//! transaction wrapping, logging and cache-group invalidation.

use std::{sync::Arc, time::Duration, time::Instant};

use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use tracing::Instrument;

use super::{
    authorization::{authorize, Authorizer, Caller},
    cache::CacheStore,
};
use crate::{error::AppResult, repository::Repository};

/// Cache behavior of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachePolicy {
    None,
    /// Serve from `key` when present, otherwise store the result in `group`
    Read { key: String, group: &'static str },
    /// Evict these groups after a successful run
    Invalidate(&'static [&'static str]),
}

/// Declared behavior of one use case
#[derive(Debug, Clone)]
pub struct Operation {
    pub name: &'static str,
    pub requires: &'static [&'static str],
    pub cache: CachePolicy,
    pub transactional: bool,
    pub logged: bool,
}

impl Operation {
    /// Read-only operation: no transaction, not logged
    pub fn query(name: &'static str) -> Self {
        Self {
            name,
            requires: &[],
            cache: CachePolicy::None,
            transactional: false,
            logged: false,
        }
    }

    /// Mutating operation: transactional and logged
    pub fn command(name: &'static str) -> Self {
        Self {
            name,
            requires: &[],
            cache: CachePolicy::None,
            transactional: true,
            logged: true,
        }
    }

    pub fn requires(mut self, capabilities: &'static [&'static str]) -> Self {
        self.requires = capabilities;
        self
    }

    /// Cache the result under `key`, registered in `group`. Without a key
    /// the operation runs uncached.
    pub fn cached(mut self, key: Option<String>, group: &'static str) -> Self {
        if let Some(key) = key {
            self.cache = CachePolicy::Read { key, group };
        }
        self
    }

    pub fn invalidates(mut self, groups: &'static [&'static str]) -> Self {
        self.cache = CachePolicy::Invalidate(groups);
        self
    }
}

/// Cache key for a query: `Name(<json parameters>)`, or `None` when the
/// parameters cannot be serialized
pub fn cache_key(name: &str, parameters: &impl Serialize) -> Option<String> {
    match serde_json::to_string(parameters) {
        Ok(parameters) => Some(format!("{}({})", name, parameters)),
        Err(e) => {
            tracing::warn!(name, error = %e, "Parameters not usable as cache key");
            None
        }
    }
}

/// Shared interceptor chain
#[derive(Clone)]
pub struct Pipeline {
    repository: Repository,
    cache: Arc<dyn CacheStore>,
    authorizer: Arc<dyn Authorizer>,
    cache_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        repository: Repository,
        cache: Arc<dyn CacheStore>,
        authorizer: Arc<dyn Authorizer>,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            cache,
            authorizer,
            cache_ttl,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// Run `handler` with the behavior declared by `operation`.
    ///
    /// Transactional handlers receive a repository bound to a fresh
    /// transaction, committed on success and rolled back on failure.
    pub async fn run<T, F>(&self, caller: &Caller, operation: Operation, handler: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Repository) -> BoxFuture<'static, AppResult<T>> + Send,
    {
        let span = tracing::info_span!(
            "operation",
            name = operation.name,
            user = ?caller.user_id,
        );
        self.execute(caller, operation, handler).instrument(span).await
    }

    async fn execute<T, F>(&self, caller: &Caller, operation: Operation, handler: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Repository) -> BoxFuture<'static, AppResult<T>> + Send,
    {
        authorize(self.authorizer.as_ref(), caller, operation.requires).await?;

        if let CachePolicy::Read { key, .. } = &operation.cache {
            if let Some(cached) = self.cached::<T>(key).await {
                tracing::debug!(key = %key, "Served from cache");
                return Ok(cached);
            }
        }

        let started = Instant::now();
        let result = if operation.transactional {
            let transaction = self.repository.begin().await?;
            match handler(transaction.clone()).await {
                Ok(value) => {
                    transaction.commit().await?;
                    Ok(value)
                }
                Err(e) => {
                    if let Err(rollback) = transaction.rollback().await {
                        tracing::error!(error = %rollback, "Rollback failed");
                    }
                    Err(e)
                }
            }
        } else {
            handler(self.repository.clone()).await
        };

        if operation.logged {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &result {
                Ok(_) => tracing::info!(elapsed_ms, "Operation completed"),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "Operation failed"),
            }
        }

        let value = result?;
        match &operation.cache {
            CachePolicy::Read { key, group } => self.store(key, group, &value).await,
            CachePolicy::Invalidate(groups) => self.invalidate(groups).await,
            CachePolicy::None => {}
        }
        Ok(value)
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, group: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Result not cacheable");
                return;
            }
        };
        if let Err(e) = self.cache.set(key, group, raw, self.cache_ttl).await {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self, groups: &[&str]) {
        for group in groups {
            match self.cache.invalidate_group(group).await {
                Ok(removed) => tracing::debug!(group, removed, "Cache group invalidated"),
                Err(e) => tracing::warn!(group, error = %e, "Cache invalidation failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;
    use uuid::Uuid;

    use super::*;
    use crate::{
        error::AppError,
        services::{
            authorization::{Capabilities, MockAuthorizer},
            cache::MemoryCache,
        },
    };

    fn pipeline(authorizer: MockAuthorizer, cache: Arc<MemoryCache>) -> Pipeline {
        Pipeline::new(
            Repository::memory(),
            cache,
            Arc::new(authorizer),
            Duration::from_secs(60),
        )
    }

    fn allow_all() -> MockAuthorizer {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_granted()
            .returning(|_| Ok(["Books.Read", "Books.Create"].into_iter().collect()));
        authorizer
    }

    #[tokio::test]
    async fn test_cached_query_runs_once_until_invalidated() {
        let cache = Arc::new(MemoryCache::new());
        let pipeline = pipeline(allow_all(), cache);
        let caller = Caller::user(Uuid::new_v4());
        let calls = Arc::new(AtomicUsize::new(0));

        let query = || {
            Operation::query("GetListBooks")
                .requires(&["Books.Read"])
                .cached(cache_key("GetListBooks", &(1, 20)), "GetBooks")
        };
        for _ in 0..2 {
            let calls = calls.clone();
            let value: usize = pipeline
                .run(&caller, query(), move |_| {
                    async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
                })
                .await
                .unwrap();
            assert_eq!(value, 1);
        }

        pipeline
            .run(
                &caller,
                Operation::command("CreateBook")
                    .requires(&["Books.Create"])
                    .invalidates(&["GetBooks"]),
                |_| async { Ok(()) }.boxed(),
            )
            .await
            .unwrap();

        let calls_after = calls.clone();
        let value: usize = pipeline
            .run(&caller, query(), move |_| {
                async move { Ok(calls_after.fetch_add(1, Ordering::SeqCst) + 1) }.boxed()
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn test_unserializable_parameters_disable_caching() {
        let parameters: std::collections::HashMap<(i32, i32), i32> = [((1, 20), 0)].into();
        let key = cache_key("GetListBooks", &parameters);
        assert!(key.is_none());

        let operation = Operation::query("GetListBooks").cached(key, "GetBooks");
        assert_eq!(operation.cache, CachePolicy::None);
        assert_eq!(
            cache_key("GetListBooks", &(1, 20)).as_deref(),
            Some("GetListBooks([1,20])")
        );
    }

    #[tokio::test]
    async fn test_failed_command_keeps_cache() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set("GetListBooks()", "GetBooks", "1".into(), Duration::from_secs(60))
            .await
            .unwrap();
        let pipeline = pipeline(allow_all(), cache.clone());

        let result: AppResult<()> = pipeline
            .run(
                &Caller::user(Uuid::new_v4()),
                Operation::command("CreateBook")
                    .requires(&["Books.Create"])
                    .invalidates(&["GetBooks"]),
                |_| async { Err(AppError::BusinessRule("Book ISBN already exists".into())) }.boxed(),
            )
            .await;

        assert!(matches!(result, Err(AppError::BusinessRule(_))));
        assert!(cache.get("GetListBooks()").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_handler_never_runs() {
        let mut authorizer = MockAuthorizer::new();
        authorizer
            .expect_granted()
            .returning(|_| Ok(Capabilities::default()));
        let pipeline = pipeline(authorizer, Arc::new(MemoryCache::new()));

        let result: AppResult<()> = pipeline
            .run(
                &Caller::user(Uuid::new_v4()),
                Operation::command("DeleteBook").requires(&["Books.Delete"]),
                |_| async { Err(AppError::Internal("handler ran".into())) }.boxed(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Authorization(_))));
    }
}
