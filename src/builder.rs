//! Builder for optimistic read-compute-write cycles.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::ttl::Ttl;
use crate::value::Value;
use std::time::Duration;

/// Ceiling for the doubled delay between attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Fluent builder around the `get_for_update` / `set_if_same` pair.
///
/// Each attempt reads the key with a validation token, hands the snapshot to
/// the caller's closure and writes the result back only if nobody changed the
/// key in between. A lost race is retried with exponential backoff.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
///
/// let seen = cache
///     .optimistic("visitors")
///     .with_ttl(Ttl::from_secs(3600))
///     .with_retry(5)
///     .with_backoff(Duration::from_millis(20))
///     .apply(|current| {
///         let mut list = current.cloned().unwrap_or_else(|| json!([]));
///         list.as_array_mut().map(|a| a.push(json!("alice")));
///         list
///     })
///     .await?;
/// ```
pub struct OptimisticUpdate<'c, B: CacheBackend> {
    cache: &'c B,
    key: String,
    ttl: Ttl,
    retry_count: u32,
    backoff: Duration,
    max_backoff: Duration,
}

impl<'c, B: CacheBackend> OptimisticUpdate<'c, B> {
    /// Create a new builder with default settings: no expiry, three retries,
    /// 100ms base backoff.
    pub(crate) fn new(cache: &'c B, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            ttl: Ttl::Never,
            retry_count: 3,
            backoff: Duration::from_millis(100),
            max_backoff: MAX_BACKOFF,
        }
    }

    /// TTL for the value written on success.
    pub fn with_ttl(mut self, ttl: impl Into<Ttl>) -> Self {
        self.ttl = ttl.into();
        self
    }

    /// Retry a lost race up to `count` more times.
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Base delay between attempts, doubled after each lost race.
    /// `Duration::ZERO` retries immediately.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Upper bound for the doubled delay. Defaults to [`MAX_BACKOFF`].
    pub fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Delay after the `attempt`-th lost race: `backoff * 2^(attempt-1)`,
    /// saturating at the ceiling.
    fn delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.backoff.checked_mul(factor))
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Run the cycle. `compute` receives the current value (`None` if
    /// absent) and returns the value to store; it may run once per attempt.
    ///
    /// Returns the value that was written.
    ///
    /// # Errors
    ///
    /// - `Error::Conflict`: every attempt lost its race
    /// - `Error::DataError`: the cache does not support optimistic updates
    /// - any error from the cache itself, unchanged and without retrying
    pub async fn apply<F>(self, mut compute: F) -> Result<Value>
    where
        F: FnMut(Option<&Value>) -> Value,
    {
        let mut attempts = 0;
        let max_attempts = self.retry_count + 1; // +1 for initial attempt

        loop {
            attempts += 1;

            let result = self.cache.get_for_update(&self.key).await?;
            let next = compute(result.value());

            if result.set_if_same(next.clone(), self.ttl).await? {
                debug!(
                    "✓ Optimistic update of {} applied (attempt {}/{})",
                    self.key, attempts, max_attempts
                );
                return Ok(next);
            }

            if attempts >= max_attempts {
                warn!(
                    "Optimistic update of {} gave up after {} attempt(s)",
                    self.key, attempts
                );
                return Err(Error::Conflict {
                    key: self.key,
                    attempts,
                });
            }

            debug!(
                "Optimistic update of {} lost a race (attempt {}/{}), retrying...",
                self.key, attempts, max_attempts
            );

            if !self.backoff.is_zero() {
                tokio::time::sleep(self.delay(attempts)).await;
            }
        }
    }
}

#[cfg(all(test, feature = "inmemory"))]
mod tests {
    use super::*;
    use crate::backend::LocalCache;
    use crate::base::BaseCache;
    use serde_json::json;

    fn bump(current: Option<&Value>) -> Value {
        json!(current.and_then(Value::as_i64).unwrap_or(0) + 1)
    }

    #[tokio::test]
    async fn test_apply_on_absent_key() {
        let cache = LocalCache::new();

        let written = cache
            .optimistic("counter")
            .apply(bump)
            .await
            .expect("Failed to apply");

        assert_eq!(written, json!(1));
        assert_eq!(
            cache.get("counter").await.expect("Failed to get"),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn test_apply_retries_after_lost_race() {
        let cache = LocalCache::new();
        let rival = cache.clone();
        let mut interference = 2;

        let written = cache
            .optimistic("counter")
            .with_backoff(Duration::ZERO)
            .apply(|current| {
                if interference > 0 {
                    interference -= 1;
                    futures::executor::block_on(rival.increment("counter"))
                        .expect("Failed to interfere");
                }
                bump(current)
            })
            .await
            .expect("Failed to apply");

        // Rival moves the key 0 -> 1; the third attempt reads 1 and wins.
        assert_eq!(written, json!(2));
        assert_eq!(
            cache.get("counter").await.expect("Failed to get"),
            Some(json!(2))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_gives_up_with_conflict() {
        let cache = LocalCache::new();
        let rival = cache.clone();
        let mut tick = 0;

        let outcome = cache
            .optimistic("counter")
            .with_retry(2)
            .with_backoff(Duration::from_millis(50))
            .apply(|current| {
                tick += 1;
                futures::executor::block_on(rival.set("counter", json!(tick * 1000), Ttl::Never))
                    .expect("Failed to interfere");
                bump(current)
            })
            .await;

        match outcome {
            Err(Error::Conflict { key, attempts }) => {
                assert_eq!(key, "counter");
                assert_eq!(attempts, 3);
            }
            other => panic!("Expected Conflict, got {:?}", other),
        }
        assert_eq!(
            cache.get("counter").await.expect("Failed to get"),
            Some(json!(3000))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_with_ttl() {
        let cache = LocalCache::new();
        cache
            .optimistic("k")
            .with_ttl(Duration::from_secs(10))
            .apply(|_| json!("fresh"))
            .await
            .expect("Failed to apply");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("k").await.expect("Failed to get"), None);
    }

    #[test]
    fn test_delay_doubles_then_saturates() {
        let cache = LocalCache::new();
        let update = cache
            .optimistic("k")
            .with_backoff(Duration::from_millis(1))
            .with_max_backoff(Duration::from_secs(1));

        assert_eq!(update.delay(1), Duration::from_millis(1));
        assert_eq!(update.delay(4), Duration::from_millis(8));
        assert_eq!(update.delay(11), Duration::from_secs(1));
        assert_eq!(update.delay(33), Duration::from_secs(1));
        assert_eq!(update.delay(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_contention_waits_at_most_the_ceiling() {
        let cache = LocalCache::new();
        let rival = cache.clone();
        let mut tick = 0;
        let started = tokio::time::Instant::now();

        let outcome = cache
            .optimistic("counter")
            .with_retry(40)
            .with_backoff(Duration::from_millis(1))
            .apply(|current| {
                tick += 1;
                futures::executor::block_on(rival.set("counter", json!(tick * 1000), Ttl::Never))
                    .expect("Failed to interfere");
                bump(current)
            })
            .await;

        match outcome {
            Err(Error::Conflict { attempts, .. }) => assert_eq!(attempts, 41),
            other => panic!("Expected Conflict, got {:?}", other),
        }

        // 1ms doubling reaches the ceiling on the 16th lost race.
        let uncapped = Duration::from_millis((1 << 15) - 1);
        let expected = uncapped + MAX_BACKOFF * 25;
        let waited = started.elapsed();
        assert!(waited >= expected, "waited {:?}", waited);
        assert!(waited < expected + Duration::from_secs(1), "waited {:?}", waited);
    }
}
