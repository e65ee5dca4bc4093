//! Memcached cache backend implementation.
//!
//! The driver exposes `get`/`set`/`add`/`delete`/`incr`/`decr`/`flush_all` but
//! no `replace`, `append`, `prepend` or `gets`/`cas`. Those operations are
//! emulated with read-modify-write and are NOT atomic: a concurrent writer
//! between the read and the write is silently overwritten. Callers that need
//! correctness under contention should use the optimistic-update pair on a
//! backend with native CAS (Redis, or `LocalCache` in-process).

use super::remote::{memcached_expiry, BackendStatus};
use super::CacheBackend;
use crate::error::{Error, Result};
use crate::key::KeyDigest;
use crate::result::{CacheResult, ValidationToken};
use crate::serialization::{decode, encode};
use crate::ttl::Ttl;
use crate::value::{self, Position, Value};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Pool};
use std::time::Duration;

/// Default Memcached connection pool size.
/// Formula: (CPU cores × 2) + 1
/// For 8-core systems: 16 connections is optimal
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Configuration for Memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211", "cache2:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
    /// Prepended to every transformed key.
    pub key_prefix: String,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: 10,
            key_prefix: String::new(),
        }
    }
}

impl MemcachedConfig {
    /// Defaults overridden by `MEMCACHED_SERVERS` (comma separated),
    /// `MEMCACHED_POOL_SIZE` and `MEMCACHED_KEY_PREFIX`.
    pub fn from_env() -> Self {
        let defaults = MemcachedConfig::default();

        let servers = std::env::var("MEMCACHED_SERVERS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|servers| !servers.is_empty())
            .unwrap_or(defaults.servers);

        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let key_prefix = std::env::var("MEMCACHED_KEY_PREFIX").unwrap_or(defaults.key_prefix);

        MemcachedConfig {
            servers,
            pool_size,
            key_prefix,
            ..defaults
        }
    }
}

macro_rules! connection {
    ($pool:expr) => {
        $pool.get().await.map_err(|e| Error::ConnectionFailure {
            message: format!("Failed to get Memcached connection: {}", e),
            code: None,
        })?
    };
}

/// Memcached adapter with connection pooling and async operations.
///
/// Caller keys are transformed with [`KeyDigest`] so arbitrary keys satisfy
/// Memcached's 250-byte, no-whitespace rule. TTLs are clamped to 30 days and a
/// negative TTL expires the entry immediately.
///
/// Counters use the server's unsigned arithmetic: `decrement` on a stored `0`
/// leaves `0` rather than going to `-1`. Negative or non-integer numbers are
/// not native counters and take the read-modify-write path, which does step
/// below zero.
///
/// # Example
///
/// ```no_run
/// # use casket::backend::{MemcachedCache, MemcachedConfig, CacheBackend};
/// # use casket::{Result, Ttl};
/// # use serde_json::json;
/// # async fn example() -> Result<()> {
/// let config = MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// };
///
/// let cache = MemcachedCache::new(config).await?;
/// cache.set("key", json!("value"), Ttl::from_secs(60)).await?;
/// let value = cache.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedCache {
    pool: Pool,
    keys: KeyDigest,
}

impl MemcachedCache {
    /// Create new Memcached backend from configuration.
    ///
    /// A connection is checked out once so an unreachable server fails here
    /// rather than on first use.
    ///
    /// # Errors
    /// - `Error::ConfigurationError`: no servers, zero pool size, invalid key prefix
    /// - `Error::ConnectionFailure`: the server cannot be reached within
    ///   `connection_timeout`
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        // deadpool-memcached Manager takes a single server address
        // Use the first server from the list
        let addr = config
            .servers
            .first()
            .ok_or_else(|| {
                Error::ConfigurationError("No memcached servers specified".to_string())
            })?
            .clone();

        if config.servers.len() > 1 {
            warn!(
                "Memcached pool uses only the first of {} configured servers",
                config.servers.len()
            );
        }

        if config.pool_size == 0 {
            return Err(Error::ConfigurationError(
                "Memcached pool size must be at least 1".to_string(),
            ));
        }

        let keys = KeyDigest::new(config.key_prefix.clone())?;

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to create connection pool: {}", e))
            })?;

        match tokio::time::timeout(config.connection_timeout, pool.get()).await {
            Ok(Ok(_conn)) => {}
            Ok(Err(e)) => {
                return Err(Error::ConnectionFailure {
                    message: format!("Failed to connect to Memcached at {}: {}", addr, e),
                    code: None,
                })
            }
            Err(_) => {
                return Err(Error::ConnectionFailure {
                    message: format!(
                        "Timed out after {:?} connecting to Memcached at {}",
                        config.connection_timeout, addr
                    ),
                    code: None,
                })
            }
        }

        info!(
            "✓ Memcached backend initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedCache { pool, keys })
    }

    /// Create from server address directly.
    ///
    /// Pool size is determined by:
    /// 1. `MEMCACHED_POOL_SIZE` environment variable (if set)
    /// 2. `DEFAULT_POOL_SIZE` constant (16)
    ///
    /// # Errors
    /// Same as [`MemcachedCache::new`].
    pub async fn from_server(addr: String) -> Result<Self> {
        let config = MemcachedConfig {
            servers: vec![addr],
            ..MemcachedConfig::from_env()
        };
        Self::new(config).await
    }

    /// Map a driver error onto an allow-listed status, or raise it.
    fn status(op: &str, key: &str, e: async_memcached::Error) -> Result<BackendStatus> {
        match e {
            async_memcached::Error::Io(io) => Err(Error::ConnectionFailure {
                message: format!("Memcached {} failed for key {}: {}", op, key, io),
                code: io.raw_os_error().map(|c| c.to_string()),
            }),
            other => BackendStatus::classify(&other.to_string()),
        }
    }

    fn unexpected(op: &str, key: &str, status: BackendStatus) -> Error {
        Error::ProtocolError {
            code: format!("{:?}", status),
            message: format!("Memcached {} for key {} reported {:?}", op, key, status),
        }
    }

    async fn store(&self, key: &str, value: &Value, ttl: Ttl) -> Result<()> {
        let bytes = encode(value)?;
        let mut conn = connection!(self.pool);

        match conn
            .set(self.keys.apply(key).as_str(), bytes.as_slice(), memcached_expiry(ttl), None)
            .await
        {
            Ok(()) => {
                debug!("✓ Memcached SET {} (TTL: {:?})", key, ttl);
                Ok(())
            }
            Err(e) => match Self::status("SET", key, e)? {
                BackendStatus::Success => Ok(()),
                status => Err(Self::unexpected("SET", key, status)),
            },
        }
    }

    /// Read, concatenate, write. Not atomic.
    async fn concat(&self, key: &str, piece: &str, ttl: Ttl, position: Position) -> Result<()> {
        let current = self.get(key).await?;
        let next = value::concatenate(current.as_ref(), piece, position);
        debug!(
            "Memcached {} {} via read-modify-write (non-atomic)",
            position.as_str().to_uppercase(),
            key
        );
        self.store(key, &next, ttl).await
    }

    async fn step(&self, key: &str, delta: i64) -> Result<()> {
        let mut conn = connection!(self.pool);
        let backend_key = self.keys.apply(key);

        let native = if delta >= 0 {
            conn.increment(backend_key.as_str(), delta as u64).await
        } else {
            conn.decrement(backend_key.as_str(), delta.unsigned_abs()).await
        };

        match native {
            Ok(n) => {
                debug!("✓ Memcached STEP {} by {} -> {}", key, delta, n);
                return Ok(());
            }
            Err(e) => {
                let reply = e.to_string();
                let non_numeric = reply.to_ascii_lowercase().contains("non-numeric");
                if !non_numeric && !Self::status("STEP", key, e)?.is_not_found() {
                    return Err(Error::ProtocolError {
                        code: reply,
                        message: format!("Memcached STEP failed for key {}", key),
                    });
                }
            }
        }
        drop(conn);

        // Missing or non-numeric: the server refused, fall back to
        // read-modify-write. The remaining TTL cannot be read back, so the
        // rewritten value never expires.
        warn!(
            "Memcached STEP {} falling back to read-modify-write (non-atomic)",
            key
        );
        let current = self.get(key).await?;
        self.store(key, &value::step(current.as_ref(), delta), Ttl::Never)
            .await
    }
}

impl CacheBackend for MemcachedCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = connection!(self.pool);

        match conn.get(self.keys.apply(key).as_str()).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                Ok(value.data.map(|data| decode(&data)))
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => match Self::status("GET", key, e)? {
                BackendStatus::NotFound => Ok(None),
                status => Err(Self::unexpected("GET", key, status)),
            },
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.store(key, &value, ttl).await?;
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        let mut conn = connection!(self.pool);

        match conn.delete(self.keys.apply(key).as_str()).await {
            Ok(()) => debug!("✓ Memcached DELETE {}", key),
            Err(e) => match Self::status("DELETE", key, e)? {
                BackendStatus::NotFound | BackendStatus::Success => {
                    debug!("✓ Memcached DELETE {} (absent)", key)
                }
                status => return Err(Self::unexpected("DELETE", key, status)),
            },
        }
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let bytes = encode(&value)?;
        let mut conn = connection!(self.pool);

        match conn
            .add(self.keys.apply(key).as_str(), bytes.as_slice(), memcached_expiry(ttl), None)
            .await
        {
            Ok(()) => debug!("✓ Memcached ADD {}", key),
            Err(e) => match Self::status("ADD", key, e)? {
                BackendStatus::NotStored | BackendStatus::AlreadyExists => {
                    debug!("Memcached ADD {} -> NOT STORED (exists)", key)
                }
                BackendStatus::Success => debug!("✓ Memcached ADD {}", key),
                status => return Err(Self::unexpected("ADD", key, status)),
            },
        }
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        // Not atomic: the key may vanish or appear between the read and the write.
        if self.get(key).await?.is_some() {
            self.store(key, &value, ttl).await?;
            debug!("✓ Memcached REPLACE {}", key);
        } else {
            debug!("Memcached REPLACE {} -> NOT STORED (absent)", key);
        }
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.concat(key, piece, ttl, Position::Append).await?;
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.concat(key, piece, ttl, Position::Prepend).await?;
        Ok(self)
    }

    /// Native `incr`. The server keeps the entry's expiry.
    async fn increment(&self, key: &str) -> Result<&Self> {
        self.step(key, 1).await?;
        Ok(self)
    }

    /// Native `decr`. Memcached clamps at zero instead of going negative.
    async fn decrement(&self, key: &str) -> Result<&Self> {
        self.step(key, -1).await?;
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        let mut conn = connection!(self.pool);

        conn.flush_all().await.map_err(|e| match Self::status("FLUSH_ALL", "*", e) {
            Err(err) => err,
            Ok(status) => Self::unexpected("FLUSH_ALL", "*", status),
        })?;

        warn!("⚠ Memcached FLUSH_ALL executed - all cache cleared!");
        Ok(self)
    }

    /// Emulated: the token is a content hash, and `set_if_same` compares and
    /// writes in two round-trips.
    fn supports_optimistic_update(&self) -> bool {
        true
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        let value = self.get(key).await?;
        let token = ValidationToken::of(value.as_ref())?;
        Ok(CacheResult::new(self, key, token, value))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        let current = self.get(result.key()).await?;
        if ValidationToken::of(current.as_ref())? != *result.token() {
            debug!("Memcached SET_IF_SAME {} -> STALE", result.key());
            return Ok(false);
        }

        self.store(result.key(), &value, ttl).await?;
        debug!(
            "✓ Memcached SET_IF_SAME {} (compare-then-set, non-atomic)",
            result.key()
        );
        Ok(true)
    }
}
