//! Operations derived from the [`CacheBackend`] primitives.

use crate::backend::CacheBackend;
use crate::builder::OptimisticUpdate;
use crate::error::Result;
use crate::handle::ValueHandle;
use crate::ttl::Ttl;
use crate::value::Value;
use std::future::Future;

/// Extension trait available on every [`CacheBackend`], including decorators.
pub trait BaseCache: CacheBackend + Sized {
    /// Return the cached value for `key`, or run `producer`, store its result
    /// with `ttl` and return that.
    ///
    /// `producer` is only invoked when the key is absent; a cached `null`,
    /// `false`, `0` or `""` counts as a hit. Producer errors are returned
    /// unchanged and nothing is stored.
    ///
    /// Two callers missing the same key concurrently may both run their
    /// producer; the last write wins.
    ///
    /// # Example
    ///
    /// ```
    /// # use casket::{backend::LocalCache, BaseCache, Ttl};
    /// # use serde_json::json;
    /// # async fn example() -> casket::Result<()> {
    /// let cache = LocalCache::new();
    /// let report = cache
    ///     .get_or_yield("report:today", Ttl::from_secs(300), || async {
    ///         Ok(json!({"rows": 42}))
    ///     })
    ///     .await?;
    /// assert_eq!(report["rows"], 42);
    /// # Ok(())
    /// # }
    /// ```
    fn get_or_yield<F, Fut>(
        &self,
        key: &str,
        ttl: Ttl,
        producer: F,
    ) -> impl Future<Output = Result<Value>> + Send
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send;

    /// Bind `key` to this cache.
    fn handle(&self, key: impl Into<String>) -> ValueHandle<'_, Self>;

    /// Start an optimistic read-compute-write of `key`.
    fn optimistic(&self, key: impl Into<String>) -> OptimisticUpdate<'_, Self>;
}

impl<B: CacheBackend> BaseCache for B {
    async fn get_or_yield<F, Fut>(&self, key: &str, ttl: Ttl, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        if let Some(value) = self.get(key).await? {
            debug!("✓ YIELD {} -> HIT", key);
            return Ok(value);
        }

        debug!("YIELD {} -> MISS, producing", key);
        let value = producer().await?;
        self.set(key, value.clone(), ttl).await?;
        Ok(value)
    }

    fn handle(&self, key: impl Into<String>) -> ValueHandle<'_, Self> {
        ValueHandle::new(self, key)
    }

    fn optimistic(&self, key: impl Into<String>) -> OptimisticUpdate<'_, Self> {
        OptimisticUpdate::new(self, key)
    }
}
