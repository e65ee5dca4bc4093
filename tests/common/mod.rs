//! Behaviour every `CacheBackend` must share, run against each store and
//! decorator chain.

#![allow(dead_code)]

use casket::{json, BaseCache, CacheBackend, Ttl, Value};
use std::time::Duration;

pub async fn roundtrip_and_absence<B: CacheBackend>(cache: &B) {
    let value = json!({"name": "ann", "roles": ["admin"], "age": 41});
    cache
        .set("user", value.clone(), Ttl::Never)
        .await
        .expect("Failed to set");
    assert_eq!(cache.get("user").await.expect("Failed to get"), Some(value));

    for (key, falsy) in [
        ("f:false", json!(false)),
        ("f:null", Value::Null),
        ("f:zero", json!(0)),
        ("f:empty", json!("")),
    ] {
        cache.set(key, falsy.clone(), Ttl::Never).await.expect("set");
        assert_eq!(cache.get(key).await.expect("get"), Some(falsy));
    }
    assert_eq!(cache.get("never-written").await.expect("get"), None);

    cache.delete("user").await.expect("Failed to delete");
    cache.delete("user").await.expect("Deleting absent key must not fail");
    assert_eq!(cache.get("user").await.expect("get"), None);
}

pub async fn add_replace_noops<B: CacheBackend>(cache: &B) {
    cache.replace("ar", json!(1), Ttl::Never).await.expect("replace");
    assert_eq!(cache.get("ar").await.expect("get"), None);

    cache.add("ar", json!(2), Ttl::Never).await.expect("add");
    cache.add("ar", json!(3), Ttl::Never).await.expect("add");
    assert_eq!(cache.get("ar").await.expect("get"), Some(json!(2)));

    cache.replace("ar", json!(4), Ttl::Never).await.expect("replace");
    assert_eq!(cache.get("ar").await.expect("get"), Some(json!(4)));
}

pub async fn concatenation<B: CacheBackend>(cache: &B) {
    cache.set("s", json!("mid"), Ttl::Never).await.expect("set");
    cache
        .append("s", "-end", Ttl::Never)
        .await
        .expect("append")
        .prepend("s", "start-", Ttl::Never)
        .await
        .expect("prepend");
    assert_eq!(cache.get("s").await.expect("get"), Some(json!("start-mid-end")));

    cache.set("n", json!(12), Ttl::Never).await.expect("set");
    cache.append("n", "3", Ttl::Never).await.expect("append");
    assert_eq!(cache.get("n").await.expect("get"), Some(json!("123")));

    // Missing and non-scalar values degrade to a plain set.
    cache.append("fresh", "x", Ttl::Never).await.expect("append");
    assert_eq!(cache.get("fresh").await.expect("get"), Some(json!("x")));

    cache.set("obj", json!({"a": 1}), Ttl::Never).await.expect("set");
    cache.prepend("obj", "y", Ttl::Never).await.expect("prepend");
    assert_eq!(cache.get("obj").await.expect("get"), Some(json!("y")));
}

pub async fn counters<B: CacheBackend>(cache: &B) {
    cache.increment("c:missing").await.expect("increment");
    assert_eq!(cache.get("c:missing").await.expect("get"), Some(json!(0)));

    cache.set("c", json!(5), Ttl::Never).await.expect("set");
    cache
        .increment("c")
        .await
        .expect("increment")
        .increment("c")
        .await
        .expect("increment")
        .decrement("c")
        .await
        .expect("decrement");
    assert_eq!(cache.get("c").await.expect("get"), Some(json!(6)));

    cache.set("c:text", json!("41"), Ttl::Never).await.expect("set");
    cache.increment("c:text").await.expect("increment");
    assert_eq!(cache.get("c:text").await.expect("get"), Some(json!(42)));

    cache.set("c:word", json!("abc"), Ttl::Never).await.expect("set");
    cache.decrement("c:word").await.expect("decrement");
    assert_eq!(cache.get("c:word").await.expect("get"), Some(json!(0)));
}

pub async fn expired_ttl<B: CacheBackend>(cache: &B) {
    cache.set("gone", json!("v"), Ttl::from_secs(-1)).await.expect("set");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(cache.get("gone").await.expect("get"), None);

    cache.set("kept", json!("v"), Ttl::from_secs(60)).await.expect("set");
    assert_eq!(cache.get("kept").await.expect("get"), Some(json!("v")));
}

pub async fn optimistic<B: CacheBackend>(cache: &B) {
    assert!(cache.supports_optimistic_update());
    cache.set("cas", json!({"v": 1}), Ttl::Never).await.expect("set");

    let first = cache.get_for_update("cas").await.expect("get_for_update");
    let second = cache.get_for_update("cas").await.expect("get_for_update");
    assert_eq!(first.key(), "cas");
    assert_eq!(first.value(), Some(&json!({"v": 1})));
    assert_eq!(first.token(), second.token());

    assert!(first
        .set_if_same(json!({"v": 2}), Ttl::Never)
        .await
        .expect("set_if_same"));
    assert!(!second
        .set_if_same(json!({"v": 3}), Ttl::Never)
        .await
        .expect("stale token must not error"));
    assert_eq!(cache.get("cas").await.expect("get"), Some(json!({"v": 2})));

    let written = cache
        .optimistic("cas:counter")
        .with_backoff(Duration::ZERO)
        .apply(|v| json!(v.and_then(Value::as_i64).unwrap_or(0) + 10))
        .await
        .expect("apply");
    assert_eq!(written, json!(10));
}

pub async fn yield_once<B: CacheBackend>(cache: &B) {
    let produced = cache
        .get_or_yield("y", Ttl::Never, || async { Ok(json!("made")) })
        .await
        .expect("yield");
    assert_eq!(produced, json!("made"));

    let cached = cache
        .get_or_yield("y", Ttl::Never, || async { Ok(json!("again")) })
        .await
        .expect("yield");
    assert_eq!(cached, json!("made"));
}

pub async fn flush_clears<B: CacheBackend>(cache: &B) {
    cache.set("before-flush", json!(1), Ttl::Never).await.expect("set");
    cache.flush().await.expect("Failed to flush");
    assert_eq!(cache.get("before-flush").await.expect("get"), None);
}

/// Every check above, in order, starting from an empty cache.
pub async fn full_contract<B: CacheBackend>(cache: &B) {
    cache.flush().await.expect("Failed to flush");
    roundtrip_and_absence(cache).await;
    add_replace_noops(cache).await;
    concatenation(cache).await;
    counters(cache).await;
    expired_ttl(cache).await;
    if cache.supports_optimistic_update() {
        optimistic(cache).await;
    }
    yield_once(cache).await;
    flush_clears(cache).await;
}
