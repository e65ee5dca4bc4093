//! Redis cache backend implementation.
//!
//! Redis gives us atomic server-side scripts, so append/prepend,
//! increment/decrement and the optimistic-update pair each run as a single
//! Lua script. Values are stored as JSON text; the scripts edit that text in
//! place. Requires Redis 6.0 or newer (`SET ... KEEPTTL`).

use super::remote::redis_px;
use super::CacheBackend;
use crate::error::{Error, Result};
use crate::result::{CacheResult, ValidationToken};
use crate::serialization::{decode, encode};
use crate::ttl::Ttl;
use crate::value::{self, Position, Value};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use redis::Script;
use std::sync::Arc;
use std::time::Duration;

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Concatenate onto a JSON scalar; non-scalars and missing keys are replaced.
/// ARGV: piece as a JSON string, "append" | "prepend", PX millis (0 = none).
const CONCAT_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
local piece = string.sub(ARGV[1], 2, -2)
local out = ARGV[1]
if raw and raw ~= 'null' then
  local first = string.sub(raw, 1, 1)
  if first ~= '[' and first ~= '{' then
    local current = raw
    if first == '"' then current = string.sub(raw, 2, -2) end
    if ARGV[2] == 'prepend' then
      out = '"' .. piece .. current .. '"'
    else
      out = '"' .. current .. piece .. '"'
    end
  end
end
local px = tonumber(ARGV[3])
if px > 0 then
  redis.call('SET', KEYS[1], out, 'PX', px)
else
  redis.call('SET', KEYS[1], out)
end
return 1
"#;

/// Add ARGV[1] to a numeric (or numeric string) value, else reset to 0.
/// The key keeps its TTL.
///
/// Only decimal text counts as numeric, so `0x10`, `inf` and `nan` reset to 0
/// as they do in [`crate::value::step`]. Plain integers go through `INCRBY`
/// and stay exact across the whole `i64` range. Floats are written with a
/// fractional part or exponent so they read back as floats.
const STEP_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
local delta = tonumber(ARGV[1])
local s = raw and (string.match(raw, '^"%s*(.-)%s*"$') or raw)
if s and string.match(s, '^%-?%d+$') then
  if s ~= raw then redis.call('SET', KEYS[1], s, 'KEEPTTL') end
  local done = redis.pcall('INCRBY', KEYS[1], delta)
  if type(done) == 'number' then return redis.call('GET', KEYS[1]) end
end
local n = nil
if s and string.match(s, '^[%-+]?%d*%.?%d*[eE]?[%-+]?%d*$') then
  n = tonumber(s)
end
local text
if n == nil then
  text = '0'
else
  n = n + delta
  if string.match(s, '^[%-+]?%d+$') and math.abs(n) < 2^53 then
    text = string.format('%d', n)
  elseif n == math.floor(n) and math.abs(n) < 1e17 then
    text = string.format('%.1f', n)
  else
    text = string.format('%.17g', n)
  end
end
redis.call('SET', KEYS[1], text, 'KEEPTTL')
return text
"#;

/// Read a value together with the SHA-1 of its stored bytes.
const FETCH_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return {} end
return {raw, redis.sha1hex(raw)}
"#;

/// Write ARGV[2] only if the stored bytes still hash to ARGV[1]
/// (empty string = key absent). ARGV[3] is PX millis (0 = none).
const SWAP_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
local current = ''
if raw then current = redis.sha1hex(raw) end
if current ~= ARGV[1] then return 0 end
local px = tonumber(ARGV[3])
if px > 0 then
  redis.call('SET', KEYS[1], ARGV[2], 'PX', px)
else
  redis.call('SET', KEYS[1], ARGV[2])
end
return 1
"#;

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String, // e.g., "redis://127.0.0.1:6379/0"
    pub connection_timeout: Duration,
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout: Duration::from_secs(5),
            pool_size: 10,
        }
    }
}

impl RedisConfig {
    /// Defaults overridden by `REDIS_URL` and `REDIS_POOL_SIZE`.
    pub fn from_env() -> Self {
        let defaults = RedisConfig::default();
        RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or(defaults.url),
            pool_size: std::env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(DEFAULT_POOL_SIZE),
            ..defaults
        }
    }
}

struct Scripts {
    concat: Script,
    step: Script,
    fetch: Script,
    swap: Script,
}

impl Scripts {
    fn load() -> Self {
        Scripts {
            concat: Script::new(CONCAT_SCRIPT),
            step: Script::new(STEP_SCRIPT),
            fetch: Script::new(FETCH_SCRIPT),
            swap: Script::new(SWAP_SCRIPT),
        }
    }
}

macro_rules! connection {
    ($pool:expr) => {
        $pool.get().await.map_err(|e| Error::ConnectionFailure {
            message: format!("Failed to get Redis connection: {}", e),
            code: None,
        })?
    };
}

fn redis_error(op: &str, key: &str, e: redis::RedisError) -> Error {
    let code = e.code().map(String::from);
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
        Error::ConnectionFailure {
            message: format!("Redis {} failed for key {}: {}", op, key, e),
            code,
        }
    } else {
        Error::ProtocolError {
            code: code.unwrap_or_else(|| format!("{:?}", e.kind())),
            message: format!("Redis {} failed for key {}: {}", op, key, e),
        }
    }
}

fn set_cmd(key: &str, bytes: &[u8], ttl: Ttl, condition: Option<&str>) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(key).arg(bytes);
    if let Some(condition) = condition {
        cmd.arg(condition);
    }
    let px = redis_px(ttl);
    if px > 0 {
        cmd.arg("PX").arg(px);
    }
    cmd
}

/// Redis adapter with connection pooling and scripted atomic operations.
///
/// # Example
///
/// ```no_run
/// # use casket::backend::{RedisCache, RedisConfig, CacheBackend};
/// # use casket::{Result, Ttl};
/// # use serde_json::json;
/// # async fn example() -> Result<()> {
/// let cache = RedisCache::new(RedisConfig::default()).await?;
/// cache.set("visits", json!(0), Ttl::Never).await?;
/// cache.increment("visits").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    scripts: Arc<Scripts>,
}

impl RedisCache {
    /// Create new Redis backend from configuration.
    ///
    /// # Errors
    /// - `Error::ConfigurationError`: empty or invalid URL, zero pool size
    /// - `Error::ConnectionFailure`: `PING` fails within `connection_timeout`
    pub async fn new(config: RedisConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::ConfigurationError(
                "No Redis URL specified".to_string(),
            ));
        }
        if config.pool_size == 0 {
            return Err(Error::ConfigurationError(
                "Redis pool size must be at least 1".to_string(),
            ));
        }

        let mut cfg = Config::from_url(config.url.clone());
        cfg.pool = Some(PoolConfig::new(config.pool_size));
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            Error::ConfigurationError(format!("Failed to create Redis pool: {}", e))
        })?;

        let probe = async {
            let mut conn = connection!(pool);
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error("PING", "-", e))?;
            Ok::<(), Error>(())
        };
        tokio::time::timeout(config.connection_timeout, probe)
            .await
            .map_err(|_| Error::ConnectionFailure {
                message: format!(
                    "Timed out after {:?} connecting to Redis",
                    config.connection_timeout
                ),
                code: None,
            })??;

        info!(
            "✓ Redis backend initialized (pool size: {})",
            config.pool_size
        );

        Ok(RedisCache {
            pool,
            scripts: Arc::new(Scripts::load()),
        })
    }

    /// Create from a URL directly, taking pool size from `REDIS_POOL_SIZE`.
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig {
            url: url.into(),
            ..RedisConfig::from_env()
        })
        .await
    }

    async fn store(&self, key: &str, value: &Value, ttl: Ttl, condition: Option<&str>) -> Result<bool> {
        let bytes = encode(value)?;
        let mut conn = connection!(self.pool);

        let reply: Option<String> = set_cmd(key, &bytes, ttl, condition)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("SET", key, e))?;
        Ok(reply.is_some())
    }

    async fn concat(&self, key: &str, piece: &str, ttl: Ttl, position: Position) -> Result<()> {
        let quoted = serde_json::to_string(piece)?;
        let native = {
            let mut conn = connection!(self.pool);
            let outcome: redis::RedisResult<i64> = self
                .scripts
                .concat
                .key(key)
                .arg(quoted)
                .arg(position.as_str())
                .arg(redis_px(ttl))
                .invoke_async(&mut conn)
                .await;
            outcome
        };

        match native.map_err(|e| redis_error(position.as_str(), key, e)) {
            Ok(_) => {
                debug!("✓ Redis {} {}", position.as_str().to_uppercase(), key);
                Ok(())
            }
            Err(Error::ProtocolError { code, .. }) => {
                warn!(
                    "Redis {} script failed ({}), falling back to read-modify-write (non-atomic)",
                    position.as_str(),
                    code
                );
                let current = self.get(key).await?;
                let next = value::concatenate(current.as_ref(), piece, position);
                self.store(key, &next, ttl, None).await.map(drop)
            }
            Err(e) => Err(e),
        }
    }

    async fn step(&self, key: &str, delta: i64) -> Result<()> {
        let mut conn = connection!(self.pool);
        let text: String = self
            .scripts
            .step
            .key(key)
            .arg(delta)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("STEP", key, e))?;
        debug!("✓ Redis STEP {} by {} -> {}", key, delta, text);
        Ok(())
    }
}

impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = connection!(self.pool);

        let raw: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("GET", key, e))?;

        match raw {
            Some(bytes) => {
                debug!("✓ Redis GET {} -> HIT", key);
                Ok(Some(decode(&bytes)))
            }
            None => {
                debug!("✓ Redis GET {} -> MISS", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.store(key, &value, ttl, None).await?;
        debug!("✓ Redis SET {} (TTL: {:?})", key, ttl);
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        let mut conn = connection!(self.pool);

        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("DEL", key, e))?;

        debug!("✓ Redis DELETE {} ({} removed)", key, removed);
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        if self.store(key, &value, ttl, Some("NX")).await? {
            debug!("✓ Redis ADD {}", key);
        } else {
            debug!("Redis ADD {} -> NOT STORED (exists)", key);
        }
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        if self.store(key, &value, ttl, Some("XX")).await? {
            debug!("✓ Redis REPLACE {}", key);
        } else {
            debug!("Redis REPLACE {} -> NOT STORED (absent)", key);
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

    async fn increment(&self, key: &str) -> Result<&Self> {
        self.step(key, 1).await?;
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        self.step(key, -1).await?;
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        let mut conn = connection!(self.pool);

        let _: () = redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(|e| redis_error("FLUSHDB", "*", e))?;

        warn!("⚠ Redis FLUSHDB executed - all cache cleared!");
        Ok(self)
    }

    fn supports_optimistic_update(&self) -> bool {
        true
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        let mut conn = connection!(self.pool);

        let reply: Vec<Vec<u8>> = self
            .scripts
            .fetch
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("GET_FOR_UPDATE", key, e))?;

        let (value, token) = match reply.as_slice() {
            [raw, sha] => (
                Some(decode(raw)),
                ValidationToken::new(String::from_utf8_lossy(sha).into_owned()),
            ),
            _ => (None, ValidationToken::new("")),
        };

        debug!("✓ Redis GET_FOR_UPDATE {} (token: {})", key, token);
        Ok(CacheResult::new(self, key, token, value))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        let bytes = encode(&value)?;
        let mut conn = connection!(self.pool);

        let applied: i64 = self
            .scripts
            .swap
            .key(result.key())
            .arg(result.token().as_str())
            .arg(bytes)
            .arg(redis_px(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| redis_error("SET_IF_SAME", result.key(), e))?;

        if applied == 1 {
            debug!("✓ Redis SET_IF_SAME {}", result.key());
        } else {
            debug!("Redis SET_IF_SAME {} -> STALE", result.key());
        }
        Ok(applied == 1)
    }
}
