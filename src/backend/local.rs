//! In-process reference backend.

use super::CacheBackend;
use crate::error::Result;
use crate::result::{CacheResult, ValidationToken};
use crate::ttl::Ttl;
use crate::value::{self, Position, Value};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// A stored value and its expiry.
#[derive(Clone, Debug)]
struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    // A deadline past the clock's range never arrives.
    fn new(value: Value, ttl: Ttl) -> Self {
        CacheEntry {
            value,
            expires_at: ttl.duration().and_then(|d| Instant::now().checked_add(d)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    fn live(&self, now: Instant) -> Option<&Value> {
        (!self.is_expired(now)).then_some(&self.value)
    }
}

/// In-memory cache backed by a concurrent map.
///
/// Clones share the same storage. Expired entries are dropped lazily on the
/// next read (or by [`LocalCache::purge_expired`]). Values are moved in on
/// write and cloned out on read, so callers can never alias stored data.
///
/// Read-modify-write operations (append, increment, `set_if_same`, ...) run
/// under the map's per-key entry lock, so they are atomic within the process.
///
/// # Example
///
/// ```
/// # use casket::{backend::LocalCache, CacheBackend, Ttl};
/// # use serde_json::json;
/// # async fn example() -> casket::Result<()> {
/// let cache = LocalCache::new();
/// cache.set("greeting", json!("hello"), Ttl::Never).await?;
/// assert_eq!(cache.get("greeting").await?, Some(json!("hello")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct LocalCache {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.store.len());
        debug!("✓ Local PURGE {} expired entries", purged);
        purged
    }

    fn concat(&self, key: &str, piece: &str, ttl: Ttl, position: Position) {
        let now = Instant::now();
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let next = value::concatenate(slot.get().live(now), piece, position);
                slot.insert(CacheEntry::new(next, ttl));
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::new(
                    value::concatenate(None, piece, position),
                    ttl,
                ));
            }
        }
        debug!("✓ Local {} {}", position.as_str().to_uppercase(), key);
    }

    fn step(&self, key: &str, delta: i64) {
        let now = Instant::now();
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.is_expired(now) {
                    *entry = CacheEntry::new(value::step(None, delta), Ttl::Never);
                } else {
                    entry.value = value::step(Some(&entry.value), delta);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::new(value::step(None, delta), Ttl::Never));
            }
        }
        debug!("✓ Local STEP {} by {}", key, delta);
    }
}

impl CacheBackend for LocalCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let lookup = self
            .store
            .get(key)
            .map(|entry| entry.live(now).cloned());

        match lookup {
            Some(Some(value)) => {
                debug!("✓ Local GET {} -> HIT", key);
                Ok(Some(value))
            }
            Some(None) => {
                self.store.remove_if(key, |_, entry| entry.is_expired(now));
                debug!("✓ Local GET {} -> EXPIRED", key);
                Ok(None)
            }
            None => {
                debug!("✓ Local GET {} -> MISS", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.store.insert(key.to_string(), CacheEntry::new(value, ttl));
        debug!("✓ Local SET {} (TTL: {:?})", key, ttl);
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        self.store.remove(key);
        debug!("✓ Local DELETE {}", key);
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let now = Instant::now();
        match self.store.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    slot.insert(CacheEntry::new(value, ttl));
                    debug!("✓ Local ADD {} (replaced expired)", key);
                } else {
                    debug!("Local ADD {} -> NOT STORED (exists)", key);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::new(value, ttl));
                debug!("✓ Local ADD {}", key);
            }
        }
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        let now = Instant::now();
        match self.store.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                *entry = CacheEntry::new(value, ttl);
                debug!("✓ Local REPLACE {}", key);
            }
            _ => debug!("Local REPLACE {} -> NOT STORED (absent)", key),
        }
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.concat(key, piece, ttl, Position::Append);
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.concat(key, piece, ttl, Position::Prepend);
        Ok(self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        self.step(key, 1);
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        self.step(key, -1);
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        let count = self.store.len();
        self.store.clear();
        warn!("⚠ Local FLUSH executed - {} entries cleared", count);
        Ok(self)
    }

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
        let now = Instant::now();
        let key = result.key();

        let applied = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                let current = ValidationToken::of(slot.get().live(now))?;
                if current == *result.token() {
                    slot.insert(CacheEntry::new(value, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                if ValidationToken::of(None)? == *result.token() {
                    slot.insert(CacheEntry::new(value, ttl));
                    true
                } else {
                    false
                }
            }
        };

        if applied {
            debug!("✓ Local SET_IF_SAME {}", key);
        } else {
            debug!("Local SET_IF_SAME {} -> STALE", key);
        }
        Ok(applied)
    }
}
