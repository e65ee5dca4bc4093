//! Key namespacing by suffix.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::Value;

/// Rewrites every key to `key + suffix` before calling the inner cache.
///
/// `flush` is passed straight to the inner cache and therefore clears every
/// key it holds, not only this namespace. Use [`GroupCache`] when a scoped
/// flush is needed.
///
/// [`GroupCache`]: super::GroupCache
#[derive(Clone, Debug)]
pub struct NamespaceSuffixCache<B> {
    suffix: String,
    inner: B,
}

impl<B: CacheBackend> NamespaceSuffixCache<B> {
    pub fn new(suffix: impl Into<String>, inner: B) -> Self {
        NamespaceSuffixCache {
            suffix: suffix.into(),
            inner,
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", key, self.suffix)
    }
}

impl<B: CacheBackend> CacheBackend for NamespaceSuffixCache<B> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(&self.key(key)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.set(&self.key(key), value, ttl).await?;
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        self.inner.delete(&self.key(key)).await?;
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.add(&self.key(key), value, ttl).await?;
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.replace(&self.key(key), value, ttl).await?;
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.inner.append(&self.key(key), piece, ttl).await?;
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.inner.prepend(&self.key(key), piece, ttl).await?;
        Ok(self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        self.inner.increment(&self.key(key)).await?;
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        self.inner.decrement(&self.key(key)).await?;
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        warn!(
            "⚠ Flushing namespace '{}' clears the whole inner cache",
            self.suffix
        );
        self.inner.flush().await?;
        Ok(self)
    }

    fn supports_optimistic_update(&self) -> bool {
        self.inner.supports_optimistic_update()
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        let result = self.inner.get_for_update(&self.key(key)).await?;
        Ok(result.rebind(self, key))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        let inner = result.retarget(&self.inner, self.key(result.key()));
        self.inner.set_if_same(&inner, value, ttl).await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::LocalCache;
    use serde_json::json;

    #[tokio::test]
    async fn test_keys_get_suffixed() {
        let inner = LocalCache::new();
        let cache = NamespaceSuffixCache::new(":v2", inner.clone());

        cache.set("user", json!("ann"), Ttl::Never).await.expect("set");

        assert_eq!(inner.get("user:v2").await.expect("get"), Some(json!("ann")));
        assert_eq!(inner.get("user").await.expect("get"), None);
        assert_eq!(cache.get("user").await.expect("get"), Some(json!("ann")));
    }

    #[tokio::test]
    async fn test_counter_and_concat_use_suffixed_key() {
        let inner = LocalCache::new();
        let cache = NamespaceSuffixCache::new("#s", inner.clone());

        cache.increment("n").await.expect("increment");
        cache.increment("n").await.expect("increment");
        cache.append("log", "a", Ttl::Never).await.expect("append");
        cache.prepend("log", "b", Ttl::Never).await.expect("prepend");

        assert_eq!(inner.get("n#s").await.expect("get"), Some(json!(1)));
        assert_eq!(inner.get("log#s").await.expect("get"), Some(json!("ba")));
    }

    #[tokio::test]
    async fn test_flush_clears_outside_namespace() {
        let inner = LocalCache::new();
        inner.set("other", json!(1), Ttl::Never).await.expect("set");
        let cache = NamespaceSuffixCache::new("_ns", &inner);
        cache.set("mine", json!(2), Ttl::Never).await.expect("set");

        cache.flush().await.expect("flush");

        assert_eq!(inner.get("other").await.expect("get"), None);
        assert!(inner.is_empty());
    }

    #[tokio::test]
    async fn test_optimistic_update_translates_keys() {
        let inner = LocalCache::new();
        let cache = NamespaceSuffixCache::new(".x", inner.clone());
        cache.set("k", json!("a"), Ttl::Never).await.expect("set");

        let result = cache.get_for_update("k").await.expect("get_for_update");
        assert_eq!(result.key(), "k");
        assert_eq!(result.value(), Some(&json!("a")));

        assert!(result
            .set_if_same(json!("b"), Ttl::Never)
            .await
            .expect("set_if_same"));
        assert_eq!(inner.get("k.x").await.expect("get"), Some(json!("b")));
        assert_eq!(inner.get("k").await.expect("get"), None);
    }
}
