//! Optimistic-update result carrier.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::ttl::Ttl;
use crate::value::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque token identifying the state of a key at read time.
///
/// Tokens are only meaningful to the backend (or decorator) that produced
/// them.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValidationToken(String);

impl ValidationToken {
    /// Wrap a backend-supplied token.
    pub fn new(token: impl Into<String>) -> Self {
        ValidationToken(token.into())
    }

    /// SHA-256 content hash of a value snapshot. Absence hashes to a token no
    /// stored value can produce.
    pub fn of(value: Option<&Value>) -> Result<Self> {
        let mut hasher = Sha256::new();
        match value {
            Some(v) => {
                hasher.update([1u8]);
                hasher.update(serde_json::to_vec(v)?);
            }
            None => hasher.update([0u8]),
        }
        Ok(ValidationToken(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot returned by [`CacheBackend::get_for_update`].
///
/// Carries the cache it was read from, so the conditional write can be issued
/// without re-threading the cache reference:
///
/// ```ignore
/// let result = cache.get_for_update("counter").await?;
/// let next = result.value().and_then(|v| v.as_i64()).unwrap_or(0) + 1;
/// if !result.set_if_same(json!(next), Ttl::Never).await? {
///     // someone else won the race; re-read and retry
/// }
/// ```
pub struct CacheResult<'c, B> {
    cache: &'c B,
    key: String,
    token: ValidationToken,
    value: Option<Value>,
}

impl<'c, B> CacheResult<'c, B> {
    /// Build a result. Backends and decorators call this; callers obtain
    /// results from `get_for_update`.
    pub fn new(
        cache: &'c B,
        key: impl Into<String>,
        token: ValidationToken,
        value: Option<Value>,
    ) -> Self {
        CacheResult {
            cache,
            key: key.into(),
            token,
            value,
        }
    }

    /// The cache this result was read from.
    pub fn cache(&self) -> &'c B {
        self.cache
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &ValidationToken {
        &self.token
    }

    /// Value at read time, `None` if the key was absent.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }

    /// Re-home this result onto another cache under another key, keeping the
    /// token and snapshot. Decorators use this to translate keys between their
    /// own key space and the inner cache's.
    pub fn rebind<'o, O>(self, cache: &'o O, key: impl Into<String>) -> CacheResult<'o, O> {
        CacheResult {
            cache,
            key: key.into(),
            token: self.token,
            value: self.value,
        }
    }

    /// Borrowing form of [`CacheResult::rebind`].
    pub fn retarget<'o, O>(&self, cache: &'o O, key: impl Into<String>) -> CacheResult<'o, O> {
        CacheResult {
            cache,
            key: key.into(),
            token: self.token.clone(),
            value: self.value.clone(),
        }
    }
}

impl<B> Clone for CacheResult<'_, B> {
    fn clone(&self) -> Self {
        self.retarget(self.cache, self.key.clone())
    }
}

impl<B> fmt::Debug for CacheResult<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheResult")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("value", &self.value)
            .finish()
    }
}

impl<B: CacheBackend> CacheResult<'_, B> {
    /// Unconditionally write `value` to this result's key.
    pub async fn set(&self, value: Value, ttl: Ttl) -> Result<()> {
        self.cache.set(&self.key, value, ttl).await?;
        Ok(())
    }

    /// Write `value` only if the key still holds the state this result was
    /// read from. Returns `false` (and writes nothing) on a stale token.
    pub async fn set_if_same(&self, value: Value, ttl: Ttl) -> Result<bool> {
        self.cache.set_if_same(self, value, ttl).await
    }
}
