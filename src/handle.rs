//! Single-key facade over a cache.

use crate::backend::CacheBackend;
use crate::base::BaseCache;
use crate::error::Result;
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::Value;
use std::future::Future;

/// One key bound to one cache.
///
/// Holds no state beyond the binding; every call goes straight to the cache.
/// Mutators return the handle so calls chain:
///
/// ```
/// # use casket::{backend::LocalCache, BaseCache, CacheBackend, Ttl};
/// # use serde_json::json;
/// # async fn example() -> casket::Result<()> {
/// let cache = LocalCache::new();
/// let hits = cache.handle("hits");
/// hits.set(json!(0), Ttl::Never).await?.increment().await?;
/// assert_eq!(hits.get().await?, Some(json!(1)));
/// # Ok(())
/// # }
/// ```
pub struct ValueHandle<'c, B> {
    cache: &'c B,
    key: String,
}

impl<B> Clone for ValueHandle<'_, B> {
    fn clone(&self) -> Self {
        ValueHandle {
            cache: self.cache,
            key: self.key.clone(),
        }
    }
}

impl<B> std::fmt::Debug for ValueHandle<'_, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueHandle").field("key", &self.key).finish()
    }
}

impl<'c, B: CacheBackend> ValueHandle<'c, B> {
    pub fn new(cache: &'c B, key: impl Into<String>) -> Self {
        ValueHandle {
            cache,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cache(&self) -> &'c B {
        self.cache
    }

    pub async fn get(&self) -> Result<Option<Value>> {
        self.cache.get(&self.key).await
    }

    pub async fn set(&self, value: Value, ttl: Ttl) -> Result<&Self> {
        self.cache.set(&self.key, value, ttl).await?;
        Ok(self)
    }

    pub async fn delete(&self) -> Result<&Self> {
        self.cache.delete(&self.key).await?;
        Ok(self)
    }

    pub async fn add(&self, value: Value, ttl: Ttl) -> Result<&Self> {
        self.cache.add(&self.key, value, ttl).await?;
        Ok(self)
    }

    pub async fn replace(&self, value: Value, ttl: Ttl) -> Result<&Self> {
        self.cache.replace(&self.key, value, ttl).await?;
        Ok(self)
    }

    pub async fn append(&self, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.cache.append(&self.key, piece, ttl).await?;
        Ok(self)
    }

    pub async fn prepend(&self, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.cache.prepend(&self.key, piece, ttl).await?;
        Ok(self)
    }

    pub async fn increment(&self) -> Result<&Self> {
        self.cache.increment(&self.key).await?;
        Ok(self)
    }

    pub async fn decrement(&self) -> Result<&Self> {
        self.cache.decrement(&self.key).await?;
        Ok(self)
    }

    /// See [`BaseCache::get_or_yield`].
    pub async fn get_or_yield<F, Fut>(&self, ttl: Ttl, producer: F) -> Result<Value>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value>> + Send,
    {
        self.cache.get_or_yield(&self.key, ttl, producer).await
    }

    pub async fn get_for_update(&self) -> Result<CacheResult<'c, B>> {
        self.cache.get_for_update(&self.key).await
    }
}
