//! Cache backend contract and implementations.
//!
//! Every store, adapter and decorator implements [`CacheBackend`]. Each
//! operation is a single awaited round-trip; implementations never spawn work
//! of their own.
//!
//! # Available Backends
//!
//! - [`LocalCache`] - in-process reference backend (feature: `inmemory`, default)
//! - [`MemcachedCache`] - Memcached adapter (feature: `memcached`)
//! - [`RedisCache`] - Redis adapter (feature: `redis`)
//! - [`RemoteCache`] - picks one of the above from a DSN

use crate::error::{Error, Result};
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::Value;
use std::future::Future;

#[cfg(feature = "inmemory")]
pub mod local;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "redis")]
pub mod redis;
pub mod remote;

#[cfg(feature = "inmemory")]
pub use local::LocalCache;
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedCache, MemcachedConfig};
#[cfg(feature = "redis")]
pub use self::redis::{RedisCache, RedisConfig};
pub use remote::{BackendStatus, RemoteCache};

/// Capability set every cache store must implement.
///
/// Mutating operations return `&Self` so calls can be chained:
///
/// ```ignore
/// cache
///     .set("a", json!(1), Ttl::Never).await?
///     .add("b", json!(2), Ttl::from_secs(60)).await?;
/// ```
///
/// The optimistic-update pair (`get_for_update` / `set_if_same`) is an
/// optional capability advertised by [`CacheBackend::supports_optimistic_update`].
/// Backends without it return [`Error::DataError`] from both methods.
pub trait CacheBackend: Send + Sync {
    /// Read a value. `None` means absent; a stored `null`, `false`, `0` or
    /// `""` is returned as `Some`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Unconditional upsert.
    fn set(&self, key: &str, value: Value, ttl: Ttl)
        -> impl Future<Output = Result<&Self>> + Send;

    /// Remove a key. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<&Self>> + Send;

    /// Store only if the key is absent.
    fn add(&self, key: &str, value: Value, ttl: Ttl)
        -> impl Future<Output = Result<&Self>> + Send;

    /// Store only if the key is present.
    fn replace(&self, key: &str, value: Value, ttl: Ttl)
        -> impl Future<Output = Result<&Self>> + Send;

    /// Concatenate `piece` after an existing scalar; otherwise set `piece`.
    fn append(&self, key: &str, piece: &str, ttl: Ttl)
        -> impl Future<Output = Result<&Self>> + Send;

    /// Concatenate `piece` before an existing scalar; otherwise set `piece`.
    fn prepend(&self, key: &str, piece: &str, ttl: Ttl)
        -> impl Future<Output = Result<&Self>> + Send;

    /// Add one to a numeric value; missing or non-numeric values become `0`.
    fn increment(&self, key: &str) -> impl Future<Output = Result<&Self>> + Send;

    /// Subtract one from a numeric value; missing or non-numeric values become `0`.
    fn decrement(&self, key: &str) -> impl Future<Output = Result<&Self>> + Send;

    /// Clear everything reachable through this instance.
    fn flush(&self) -> impl Future<Output = Result<&Self>> + Send;

    /// Whether `get_for_update` / `set_if_same` are available.
    fn supports_optimistic_update(&self) -> bool {
        false
    }

    /// Read a value together with a validation token for [`CacheBackend::set_if_same`].
    fn get_for_update(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<CacheResult<'_, Self>>> + Send
    where
        Self: Sized,
    {
        let _ = key;
        async { Err(Error::optimistic_unsupported(std::any::type_name::<Self>())) }
    }

    /// Write `value` only if `result`'s key still holds the state it was read
    /// from. A stale token is a silent no-op reported as `Ok(false)`.
    fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> impl Future<Output = Result<bool>> + Send
    where
        Self: Sized,
    {
        let _ = (result, value, ttl);
        async { Err(Error::optimistic_unsupported(std::any::type_name::<Self>())) }
    }
}

/// Borrowed backends are backends too, so decorators can wrap a cache they do
/// not own.
impl<B: CacheBackend> CacheBackend for &B {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        (**self).set(key, value, ttl).await?;
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        (**self).delete(key).await?;
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        (**self).add(key, value, ttl).await?;
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        (**self).replace(key, value, ttl).await?;
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        (**self).append(key, piece, ttl).await?;
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        (**self).prepend(key, piece, ttl).await?;
        Ok(self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        (**self).increment(key).await?;
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        (**self).decrement(key).await?;
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        (**self).flush().await?;
        Ok(self)
    }

    fn supports_optimistic_update(&self) -> bool {
        (**self).supports_optimistic_update()
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        let result = (**self).get_for_update(key).await?;
        Ok(result.rebind(self, key))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        let inner = result.retarget(*self, result.key());
        (**self).set_if_same(&inner, value, ttl).await
    }
}
