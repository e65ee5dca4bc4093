//! Generation-scoped key groups with O(1) invalidation.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::key::{group_generation, group_member};
use crate::result::CacheResult;
use crate::ttl::Ttl;
use crate::value::{scalar_text, Value};
use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::sync::Mutex;

/// Length of a generated generation token.
const TOKEN_LEN: usize = 16;

fn fresh_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Groups keys under a generation token stored in the inner cache.
///
/// Member keys are `<group>_<token>_<key>`; the token lives at
/// `<group>_GroupValue`. [`flush`](CacheBackend::flush) writes a new token,
/// which orphans every member key at once. Orphans are never deleted; they
/// linger until the inner cache expires or evicts them.
///
/// The token is resolved on first use and memoized for the lifetime of this
/// instance. Another instance flushing the same group is not observed until a
/// new instance is built.
///
/// # Example
///
/// ```
/// # use casket::{backend::LocalCache, CacheBackend, GroupCache, Ttl};
/// # use serde_json::json;
/// # async fn example() -> casket::Result<()> {
/// let sessions = GroupCache::new("sessions", LocalCache::new())?;
/// sessions.set("alice", json!({"cart": 3}), Ttl::from_secs(900)).await?;
/// sessions.flush().await?; // every session gone
/// assert_eq!(sessions.get("alice").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GroupCache<B> {
    group: String,
    inner: B,
    generation: Mutex<Option<String>>,
}

impl<B: CacheBackend> GroupCache<B> {
    /// # Errors
    /// Returns `Error::ArgumentError` if `group` is empty.
    pub fn new(group: impl Into<String>, inner: B) -> Result<Self> {
        let group = group.into();
        if group.is_empty() {
            return Err(Error::ArgumentError(
                "Group name must not be empty".to_string(),
            ));
        }
        Ok(GroupCache {
            group,
            inner,
            generation: Mutex::new(None),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Current generation token, resolving it from the inner cache (or
    /// creating and persisting one) on first use.
    pub async fn generation(&self) -> Result<String> {
        let mut memo = self.generation.lock().await;
        if let Some(token) = memo.as_ref() {
            return Ok(token.clone());
        }

        let reserved = group_generation(&self.group);
        let token = match self.stored_generation(&reserved).await? {
            Some(token) => token,
            None => {
                // `add` so that two instances racing on a new group agree on
                // whichever token landed first.
                let candidate = fresh_token();
                self.inner
                    .add(&reserved, Value::String(candidate.clone()), Ttl::Never)
                    .await?;
                match self.stored_generation(&reserved).await? {
                    Some(token) => token,
                    None => {
                        // The key holds something that is not a token.
                        warn!(
                            "Group {} generation key held an unusable value, overwriting",
                            self.group
                        );
                        self.inner
                            .set(&reserved, Value::String(candidate.clone()), Ttl::Never)
                            .await?;
                        candidate
                    }
                }
            }
        };

        debug!("✓ Group {} generation -> {}", self.group, token);
        *memo = Some(token.clone());
        Ok(token)
    }

    async fn stored_generation(&self, reserved: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .get(reserved)
            .await?
            .as_ref()
            .and_then(scalar_text)
            .filter(|t| !t.is_empty()))
    }

    async fn member(&self, key: &str) -> Result<String> {
        let token = self.generation().await?;
        Ok(group_member(&self.group, &token, key))
    }

    fn require_optimistic(&self) -> Result<()> {
        if self.inner.supports_optimistic_update() {
            Ok(())
        } else {
            Err(Error::optimistic_unsupported(std::any::type_name::<B>()))
        }
    }
}

impl<B: CacheBackend> CacheBackend for GroupCache<B> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.inner.get(&self.member(key).await?).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.set(&self.member(key).await?, value, ttl).await?;
        Ok(self)
    }

    async fn delete(&self, key: &str) -> Result<&Self> {
        self.inner.delete(&self.member(key).await?).await?;
        Ok(self)
    }

    async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.add(&self.member(key).await?, value, ttl).await?;
        Ok(self)
    }

    async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
        self.inner.replace(&self.member(key).await?, value, ttl).await?;
        Ok(self)
    }

    async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.inner.append(&self.member(key).await?, piece, ttl).await?;
        Ok(self)
    }

    async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
        self.inner.prepend(&self.member(key).await?, piece, ttl).await?;
        Ok(self)
    }

    async fn increment(&self, key: &str) -> Result<&Self> {
        self.inner.increment(&self.member(key).await?).await?;
        Ok(self)
    }

    async fn decrement(&self, key: &str) -> Result<&Self> {
        self.inner.decrement(&self.member(key).await?).await?;
        Ok(self)
    }

    /// Rotate the generation token. Only this group's keys become
    /// unreachable; the inner cache is not flushed.
    async fn flush(&self) -> Result<&Self> {
        let mut memo = self.generation.lock().await;
        let token = fresh_token();
        self.inner
            .set(
                &group_generation(&self.group),
                Value::String(token.clone()),
                Ttl::Never,
            )
            .await?;
        info!("✓ Group {} rotated to generation {}", self.group, token);
        *memo = Some(token);
        Ok(self)
    }

    fn supports_optimistic_update(&self) -> bool {
        self.inner.supports_optimistic_update()
    }

    async fn get_for_update(&self, key: &str) -> Result<CacheResult<'_, Self>> {
        self.require_optimistic()?;
        let result = self.inner.get_for_update(&self.member(key).await?).await?;
        Ok(result.rebind(self, key))
    }

    async fn set_if_same(
        &self,
        result: &CacheResult<'_, Self>,
        value: Value,
        ttl: Ttl,
    ) -> Result<bool> {
        self.require_optimistic()?;
        let inner = result.retarget(&self.inner, self.member(result.key()).await?);
        self.inner.set_if_same(&inner, value, ttl).await
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::LocalCache;
    use crate::decorator::LayeredCache;
    use serde_json::json;

    #[test]
    fn test_fresh_token_is_alphanumeric() {
        let token = fresh_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, fresh_token());
    }

    #[test]
    fn test_empty_group_name_rejected() {
        assert!(matches!(
            GroupCache::new("", LocalCache::new()),
            Err(Error::ArgumentError(_))
        ));
    }

    #[tokio::test]
    async fn test_generation_is_persisted_and_memoized() {
        let inner = LocalCache::new();
        let group = GroupCache::new("users", inner.clone()).expect("group");

        let token = group.generation().await.expect("generation");
        assert_eq!(
            inner.get("users_GroupValue").await.expect("get"),
            Some(json!(token.clone()))
        );

        // Changing the stored token behind this instance's back is not seen.
        inner
            .set("users_GroupValue", json!("elsewhere"), Ttl::Never)
            .await
            .expect("set");
        assert_eq!(group.generation().await.expect("generation"), token);
    }

    #[tokio::test]
    async fn test_existing_generation_is_adopted() {
        let inner = LocalCache::new();
        inner
            .set("users_GroupValue", json!("abc"), Ttl::Never)
            .await
            .expect("set");

        let group = GroupCache::new("users", inner.clone()).expect("group");
        group.set("42", json!("ann"), Ttl::Never).await.expect("set");

        assert_eq!(
            inner.get("users_abc_42").await.expect("get"),
            Some(json!("ann"))
        );
    }

    #[tokio::test]
    async fn test_instances_share_members() {
        let inner = LocalCache::new();
        let a = GroupCache::new("g", inner.clone()).expect("group");
        let b = GroupCache::new("g", inner.clone()).expect("group");

        a.set("k", json!(1), Ttl::Never).await.expect("set");
        assert_eq!(b.get("k").await.expect("get"), Some(json!(1)));
        assert_eq!(
            a.generation().await.expect("generation"),
            b.generation().await.expect("generation")
        );
    }

    #[tokio::test]
    async fn test_unusable_generation_is_overwritten() {
        for junk in [json!(""), json!(null), json!([1, 2]), json!({"a": 1})] {
            let inner = LocalCache::new();
            inner
                .set("g_GroupValue", junk.clone(), Ttl::Never)
                .await
                .expect("set");

            let a = GroupCache::new("g", inner.clone()).expect("group");
            let b = GroupCache::new("g", inner.clone()).expect("group");

            let token = a.generation().await.expect("generation");
            assert_eq!(
                inner.get("g_GroupValue").await.expect("get"),
                Some(json!(token.clone())),
                "token over {} was not persisted",
                junk
            );
            assert_eq!(b.generation().await.expect("generation"), token);

            a.set("k", json!(1), Ttl::Never).await.expect("set");
            assert_eq!(b.get("k").await.expect("get"), Some(json!(1)));
        }
    }

    #[tokio::test]
    async fn test_flush_orphans_only_this_group() {
        let inner = LocalCache::new();
        inner.set("unrelated", json!("keep"), Ttl::Never).await.expect("set");
        let users = GroupCache::new("users", inner.clone()).expect("group");
        let posts = GroupCache::new("posts", inner.clone()).expect("group");

        users.set("1", json!("ann"), Ttl::Never).await.expect("set");
        posts.set("1", json!("hello"), Ttl::Never).await.expect("set");
        let before = users.generation().await.expect("generation");

        users.flush().await.expect("flush");

        assert_ne!(users.generation().await.expect("generation"), before);
        assert_eq!(users.get("1").await.expect("get"), None);
        assert_eq!(posts.get("1").await.expect("get"), Some(json!("hello")));
        assert_eq!(inner.get("unrelated").await.expect("get"), Some(json!("keep")));

        // Orphan still physically present under the old generation.
        assert_eq!(
            inner
                .get(&group_member("users", &before, "1"))
                .await
                .expect("get"),
            Some(json!("ann"))
        );
    }

    #[tokio::test]
    async fn test_optimistic_update_round_trips_bare_key() {
        let inner = LocalCache::new();
        let group = GroupCache::new("g", inner.clone()).expect("group");
        group.set("k", json!(10), Ttl::Never).await.expect("set");

        let result = group.get_for_update("k").await.expect("get_for_update");
        assert_eq!(result.key(), "k");
        assert_eq!(result.value(), Some(&json!(10)));

        assert!(result
            .set_if_same(json!(11), Ttl::Never)
            .await
            .expect("set_if_same"));
        assert_eq!(group.get("k").await.expect("get"), Some(json!(11)));

        let token = group.generation().await.expect("generation");
        assert_eq!(
            inner.get(&group_member("g", &token, "k")).await.expect("get"),
            Some(json!(11))
        );
    }

    #[tokio::test]
    async fn test_optimistic_update_stale_after_flush() {
        let group = GroupCache::new("g", LocalCache::new()).expect("group");
        group.set("k", json!(1), Ttl::Never).await.expect("set");

        let result = group.get_for_update("k").await.expect("get_for_update");
        group.flush().await.expect("flush");

        assert!(!result
            .set_if_same(json!(2), Ttl::Never)
            .await
            .expect("set_if_same"));
        assert_eq!(group.get("k").await.expect("get"), None);
    }

    /// Forwards the plain operations only.
    struct NoCas(LocalCache);

    impl CacheBackend for NoCas {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
            self.0.set(key, value, ttl).await?;
            Ok(self)
        }
        async fn delete(&self, key: &str) -> Result<&Self> {
            self.0.delete(key).await?;
            Ok(self)
        }
        async fn add(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
            self.0.add(key, value, ttl).await?;
            Ok(self)
        }
        async fn replace(&self, key: &str, value: Value, ttl: Ttl) -> Result<&Self> {
            self.0.replace(key, value, ttl).await?;
            Ok(self)
        }
        async fn append(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
            self.0.append(key, piece, ttl).await?;
            Ok(self)
        }
        async fn prepend(&self, key: &str, piece: &str, ttl: Ttl) -> Result<&Self> {
            self.0.prepend(key, piece, ttl).await?;
            Ok(self)
        }
        async fn increment(&self, key: &str) -> Result<&Self> {
            self.0.increment(key).await?;
            Ok(self)
        }
        async fn decrement(&self, key: &str) -> Result<&Self> {
            self.0.decrement(key).await?;
            Ok(self)
        }
        async fn flush(&self) -> Result<&Self> {
            self.0.flush().await?;
            Ok(self)
        }
    }

    #[tokio::test]
    async fn test_optimistic_update_requires_inner_capability() {
        let group = GroupCache::new("g", NoCas(LocalCache::new())).expect("group");
        assert!(!group.supports_optimistic_update());
        assert!(matches!(
            group.get_for_update("k").await,
            Err(Error::DataError(_))
        ));

        // Plain operations still work.
        group.set("k", json!(1), Ttl::Never).await.expect("set");
        assert_eq!(group.get("k").await.expect("get"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_optimistic_update_over_layered_inner() {
        let layered = LayeredCache::new(LocalCache::new(), LocalCache::new());
        let group = GroupCache::new("g", layered).expect("group");
        assert!(group.supports_optimistic_update());

        let result = group.get_for_update("k").await.expect("get_for_update");
        assert!(result
            .set_if_same(json!("v"), Ttl::Never)
            .await
            .expect("set_if_same"));
        assert_eq!(
            group.inner().secondary().get(&group_member(
                "g",
                &group.generation().await.expect("generation"),
                "k"
            ))
            .await
            .expect("get"),
            Some(json!("v"))
        );
    }
}
