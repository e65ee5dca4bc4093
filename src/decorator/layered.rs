//! Two-tier cache: a fast primary in front of a slower secondary.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::Value;

/// Writes go to both caches; reads try `primary` and fall back to
/// `secondary` only when the primary has no entry.
///
/// The layers are never reconciled: a secondary hit is not copied back into
/// the primary, and a write that fails on one layer may already have landed
/// on the other.
///
/// Optimistic updates are available when the primary supports them. The
/// token comes from the primary; after a successful conditional write there
/// the secondary receives a plain `set`. When the primary has no entry the
/// snapshot value is read from the secondary, as `get` would, while the token
/// still guards the primary's absence.
#[derive(Clone, Debug)]
pub struct LayeredCache<P, S> {
    primary: P,
    secondary: S,
}

impl<P: CacheBackend, S: CacheBackend> LayeredCache<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        LayeredCache { primary, secondary }
    }

    pub fn primary(&self) -> &P {
        &self.primary
    }

    pub fn secondary(&self) -> &S {
        &self.secondary
    }
}

impl<P: CacheBackend, S: CacheBackend> CacheBackend for LayeredCache<P, S> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.primary.get(key).await? {
            return Ok(Some(value));
        }
        debug!("Layered GET {} -> primary MISS, trying secondary", key);
        self.secondary.get(key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        futures::try_join!(
            self.primary.set(key, value.clone(), ttl),
            self.secondary.set(key, value, ttl)
        )?;
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        futures::try_join!(self.primary.delete(key), self.secondary.delete(key))?;
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        futures::try_join!(
            self.primary.add(key, value.clone(), ttl),
            self.secondary.add(key, value, ttl)
        )?;
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        futures::try_join!(
            self.primary.replace(key, value.clone(), ttl),
            self.secondary.replace(key, value, ttl)
        )?;
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        futures::try_join!(
            self.primary.append(key, piece, ttl),
            self.secondary.append(key, piece, ttl)
        )?;
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        futures::try_join!(
            self.primary.prepend(key, piece, ttl),
            self.secondary.prepend(key, piece, ttl)
        )?;
        Ok(self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        futures::try_join!(self.primary.increment(key), self.secondary.increment(key))?;
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        futures::try_join!(self.primary.decrement(key), self.secondary.decrement(key))?;
        Ok(self)
    }

    async fn flush(&self) -> Result<&Self> {
        futures::try_join!(self.primary.flush(), self.secondary.flush())?;
        Ok(self)
    }

    fn supports_optimistic_update(&self) -> bool {
        self.primary.supports_optimistic_update()
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        let result = self.primary.get_for_update(key).await?;
        if result.value().is_some() {
            return Ok(result.rebind(self, key));
        }

        debug!("Layered GET_FOR_UPDATE {} -> primary MISS, trying secondary", key);
        let fallback = self.secondary.get(key).await?;
        Ok(CacheResult::new(self, key, result.token().clone(), fallback))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        let inner = result.retarget(&self.primary, result.key());
        if !self.primary.set_if_same(&inner, value.clone(), ttl).await? {
            return Ok(false);
        }
        self.secondary.set(result.key(), value, ttl).await?;
        Ok(true)
    }
}
