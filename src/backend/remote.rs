//! Shared plumbing for remote adapters and the DSN-driven [`RemoteCache`].
//!
//! Adapters translate the [`CacheBackend`] contract onto stores with very
//! different atomicity and error models. What they share lives here: status
//! classification against the non-error allow-list, and TTL translation.

use super::CacheBackend;
use crate::error::{Error, Result};
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::Value;
use std::time::Duration;

#[cfg(feature = "memcached")]
use super::memcached::{MemcachedCache, MemcachedConfig};
#[cfg(feature = "redis")]
use super::redis::{RedisCache, RedisConfig};

/// Longest relative expiry Memcached accepts; larger values are read as unix
/// timestamps by the server.
pub const MEMCACHED_MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Environment variable read by [`RemoteCache::from_env`].
pub const CACHE_URL_ENV: &str = "CACHE_URL";

/// Backend statuses that are not errors.
///
/// Anything a backend reports outside this set is raised as
/// [`Error::ProtocolError`] carrying the original code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendStatus {
    Success,
    NotFound,
    NotStored,
    AlreadyExists,
}

impl BackendStatus {
    /// Classify a textual backend reply (`STORED`, `NOT_FOUND`,
    /// `SERVER_ERROR out of memory`, `protocol: not stored`, ...).
    ///
    /// # Errors
    /// Returns `Error::ProtocolError` for any reply outside the allow-list.
    pub fn classify(reply: &str) -> Result<Self> {
        let normalized = reply.trim().to_ascii_lowercase().replace('_', " ");

        // Error replies may quote a status word, so they are checked first.
        let is_error = normalized.starts_with("error")
            || normalized.contains("client error")
            || normalized.contains("server error");
        if is_error {
            return Err(Error::ProtocolError {
                code: reply.trim().to_string(),
                message: format!("Backend replied {:?}", reply.trim()),
            });
        }

        if normalized.contains("not found") {
            Ok(BackendStatus::NotFound)
        } else if normalized.contains("not stored") {
            Ok(BackendStatus::NotStored)
        } else if normalized.contains("exists") {
            Ok(BackendStatus::AlreadyExists)
        } else if normalized.contains("error") {
            Err(Error::ProtocolError {
                code: reply.trim().to_string(),
                message: format!("Backend replied {:?}", reply.trim()),
            })
        } else if ["stored", "deleted", "touched", "ok", "success"]
            .iter()
            .any(|word| normalized.ends_with(word))
        {
            Ok(BackendStatus::Success)
        } else {
            Err(Error::ProtocolError {
                code: reply.trim().to_string(),
                message: format!("Unrecognized backend reply {:?}", reply.trim()),
            })
        }
    }

    /// Whether the status reports a missing key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendStatus::NotFound)
    }
}

/// Memcached expiry argument for a TTL: `None` never expires, `-1` expires
/// immediately, finite TTLs are clamped to 30 days and rounded up to a whole
/// second.
pub fn memcached_expiry(ttl: Ttl) -> Option<i64> {
    match ttl.clamp(MEMCACHED_MAX_TTL) {
        Ttl::Never => None,
        Ttl::Expired => Some(-1),
        Ttl::After(d) => {
            let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
            Some(secs.max(1) as i64)
        }
    }
}

/// Redis `PX` argument for a TTL: `0` means no expiry, an already expired TTL
/// becomes one millisecond.
pub fn redis_px(ttl: Ttl) -> u64 {
    match ttl {
        Ttl::Never => 0,
        Ttl::Expired => 1,
        Ttl::After(d) => u64::try_from(d.as_millis()).unwrap_or(u64::MAX).max(1),
    }
}

/// A remote adapter chosen at runtime from a DSN.
///
/// `memcache://host:port[,host:port]` and `memcached://...` select
/// [`MemcachedCache`]; `redis://...` and `rediss://...` select
/// [`RedisCache`]. Asking for a driver that was not compiled in fails at
/// construction with [`Error::ExtensionUnavailable`].
///
/// # Example
///
/// ```no_run
/// # use casket::backend::RemoteCache;
/// # async fn example() -> casket::Result<()> {
/// let cache = RemoteCache::connect("redis://127.0.0.1:6379").await?;
/// # Ok(())
/// # }
/// ```
#[non_exhaustive]
pub enum RemoteCache {
    #[cfg(feature = "memcached")]
    Memcached(MemcachedCache),
    #[cfg(feature = "redis")]
    Redis(RedisCache),
}

macro_rules! dispatch {
    ($self:ident, $cache:ident => $call:expr) => {
        match *$self {
            #[cfg(feature = "memcached")]
            RemoteCache::Memcached(ref $cache) => $call,
            #[cfg(feature = "redis")]
            RemoteCache::Redis(ref $cache) => $call,
        }
    };
}

impl RemoteCache {
    /// Connect to the backend named by `dsn`.
    ///
    /// # Errors
    /// - `Error::ConfigurationError`: malformed DSN or unknown scheme
    /// - `Error::ExtensionUnavailable`: the scheme's driver feature is disabled
    /// - `Error::ConnectionFailure`: the backend is unreachable
    pub async fn connect(dsn: &str) -> Result<Self> {
        let (scheme, rest) = dsn.split_once("://").ok_or_else(|| {
            Error::ConfigurationError(format!("Cache DSN {:?} has no scheme", dsn))
        })?;

        match scheme {
            "memcache" | "memcached" => Self::connect_memcached(rest).await,
            "redis" | "rediss" => Self::connect_redis(dsn).await,
            other => Err(Error::ConfigurationError(format!(
                "Unsupported cache scheme `{}`",
                other
            ))),
        }
    }

    /// Connect using the DSN in the `CACHE_URL` environment variable.
    pub async fn from_env() -> Result<Self> {
        let dsn = std::env::var(CACHE_URL_ENV).map_err(|_| {
            Error::ConfigurationError(format!("{} is not set", CACHE_URL_ENV))
        })?;
        Self::connect(&dsn).await
    }

    #[cfg(feature = "memcached")]
    async fn connect_memcached(servers: &str) -> Result<Self> {
        let config = MemcachedConfig {
            servers: servers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            ..MemcachedConfig::from_env()
        };
        MemcachedCache::new(config).await.map(RemoteCache::Memcached)
    }

    #[cfg(not(feature = "memcached"))]
    async fn connect_memcached(_servers: &str) -> Result<Self> {
        Err(Error::ExtensionUnavailable(
            "Memcached support is not compiled in; enable the `memcached` feature".to_string(),
        ))
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(dsn: &str) -> Result<Self> {
        let config = RedisConfig {
            url: dsn.to_string(),
            ..RedisConfig::from_env()
        };
        RedisCache::new(config).await.map(RemoteCache::Redis)
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(_dsn: &str) -> Result<Self> {
        Err(Error::ExtensionUnavailable(
            "Redis support is not compiled in; enable the `redis` feature".to_string(),
        ))
    }
}

#[allow(unused_variables, unreachable_code)]
impl CacheBackend for RemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        dispatch!(self, c => c.get(key).await)
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.set(key, value, ttl).await.map(drop));
        outcome.map(|_| self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.delete(key).await.map(drop));
        outcome.map(|_| self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.add(key, value, ttl).await.map(drop));
        outcome.map(|_| self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let outcome: Result<()> =
            dispatch!(self, c => c.replace(key, value, ttl).await.map(drop));
        outcome.map(|_| self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.append(key, piece, ttl).await.map(drop));
        outcome.map(|_| self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        let outcome: Result<()> =
            dispatch!(self, c => c.prepend(key, piece, ttl).await.map(drop));
        outcome.map(|_| self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.increment(key).await.map(drop));
        outcome.map(|_| self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.decrement(key).await.map(drop));
        outcome.map(|_| self)
    }

    async fn flush(&self) -> Result<&Self> {
        let outcome: Result<()> = dispatch!(self, c => c.flush().await.map(drop));
        outcome.map(|_| self)
    }

    fn supports_optimistic_update(&self) -> bool {
        dispatch!(self, c => c.supports_optimistic_update())
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        dispatch!(self, c => c
            .get_for_update(key)
            .await
            .map(|result| result.rebind(self, key)))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        dispatch!(self, c => {
            let inner = result.retarget(c, result.key());
            c.set_if_same(&inner, value, ttl).await
        })
    }
}
