//! Live tests against real servers. Run with e.g.
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test --features all -- --ignored`.

mod common;

#[cfg(feature = "redis")]
mod redis {
    use super::common;
    use casket::backend::{RedisCache, RedisConfig, RemoteCache};
    use casket::{json, CacheBackend, GroupCache, Ttl};

    async fn connect() -> RedisCache {
        RedisCache::new(RedisConfig::from_env())
            .await
            .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redis_honours_contract() {
        common::full_contract(&connect().await).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redis_increment_keeps_ttl() {
        let cache = connect().await;
        cache.set("ttl-counter", json!(1), Ttl::from_secs(1)).await.expect("set");
        cache.increment("ttl-counter").await.expect("increment");
        assert_eq!(cache.get("ttl-counter").await.expect("get"), Some(json!(2)));

        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert_eq!(cache.get("ttl-counter").await.expect("get"), None);
    }

    #[cfg(feature = "inmemory")]
    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redis_step_agrees_with_local_cache() {
        let redis = connect().await;
        let local = casket::backend::LocalCache::new();

        for (key, start) in [
            ("step:hex", json!("0x10")),
            ("step:inf", json!("inf")),
            ("step:float", json!(1.5)),
            ("step:whole-float", json!(1.0)),
            ("step:text", json!(" 41 ")),
            ("step:big", json!(i64::MAX - 1)),
            ("step:overflow", json!(i64::MAX)),
        ] {
            redis.set(key, start.clone(), Ttl::Never).await.expect("set");
            local.set(key, start, Ttl::Never).await.expect("set");
            redis.increment(key).await.expect("increment");
            local.increment(key).await.expect("increment");
            assert_eq!(
                redis.get(key).await.expect("get"),
                local.get(key).await.expect("get"),
                "{} diverged",
                key
            );
        }
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn redis_group_over_remote_dispatch() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let remote = RemoteCache::connect(&url).await.expect("Failed to connect");
        let group = GroupCache::new("it", remote).expect("group");
        common::full_contract(&group).await;
    }
}

#[cfg(feature = "memcached")]
mod memcached {
    use super::common;
    use casket::backend::{MemcachedCache, MemcachedConfig};
    use casket::{json, CacheBackend, Ttl};

    async fn connect() -> MemcachedCache {
        MemcachedCache::new(MemcachedConfig::from_env())
            .await
            .expect("Failed to connect to Memcached")
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn memcached_honours_contract() {
        common::full_contract(&connect().await).await;
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn memcached_accepts_unrestricted_keys() {
        let cache = connect().await;
        let key = format!("spaces and\nnewlines {}", "x".repeat(400));
        cache.set(&key, json!("ok"), Ttl::Never).await.expect("set");
        assert_eq!(cache.get(&key).await.expect("get"), Some(json!("ok")));
    }

    #[tokio::test]
    #[ignore = "requires a running Memcached server"]
    async fn memcached_decrement_clamps_at_zero() {
        let cache = connect().await;
        cache.set("floor", json!(0), Ttl::Never).await.expect("set");
        cache.decrement("floor").await.expect("decrement");
        assert_eq!(cache.get("floor").await.expect("get"), Some(json!(0)));

        cache.set("below", json!(-3), Ttl::Never).await.expect("set");
        cache.decrement("below").await.expect("decrement");
        assert_eq!(cache.get("below").await.expect("get"), Some(json!(-4)));
    }
}
