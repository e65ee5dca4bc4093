//! Basic usage example of the cache contract and its decorators.

use casket::{
    backend::LocalCache, error::Result, json, BaseCache, CacheBackend, GroupCache, LayeredCache,
    NamespaceSuffixCache, Ttl, Value,
};
use std::time::Duration;

/// Mock loader that simulates an expensive lookup
async fn load_employment(id: &str) -> Result<Value> {
    println!("  [DB] Fetching employment: {}", id);
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok(json!({
        "id": id,
        "employer_name": "Acme Corp",
        "salary": 75000.0,
    }))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== casket - Basic Example ===\n");

    // 1. Initialize cache backend
    println!("1. Initializing in-memory cache backend...");
    let cache = LocalCache::new();
    println!("   ✓ Cache backend ready\n");

    // 2. Compute on miss, then hit
    println!("2. get_or_yield for emp_001 (twice):");
    for _ in 0..2 {
        let emp = cache
            .get_or_yield("employment:emp_001", Ttl::from_secs(300), || {
                load_employment("emp_001")
            })
            .await?;
        println!("   ✓ Employment: {}", emp["employer_name"]);
    }
    println!();

    // 3. Counters and strings
    println!("3. Counters and concatenation:");
    let visits = cache.handle("visits");
    visits.increment().await?.increment().await?.increment().await?;
    println!("   ✓ visits = {}", visits.get().await?.unwrap_or(Value::Null));

    cache
        .set("trail", json!("b"), Ttl::Never)
        .await?
        .append("trail", "c", Ttl::Never)
        .await?
        .prepend("trail", "a", Ttl::Never)
        .await?;
    println!("   ✓ trail = {}\n", cache.get("trail").await?.unwrap_or(Value::Null));

    // 4. Optimistic update with retries
    println!("4. Optimistic update:");
    let list = cache
        .optimistic("recent")
        .with_retry(5)
        .with_backoff(Duration::from_millis(10))
        .apply(|current| {
            let mut list = current.cloned().unwrap_or_else(|| json!([]));
            if let Some(items) = list.as_array_mut() {
                items.push(json!("emp_001"));
            }
            list
        })
        .await?;
    println!("   ✓ recent = {}\n", list);

    // 5. Group invalidation
    println!("5. Group invalidation:");
    let users = GroupCache::new("users", cache.clone())?;
    users.set("42", json!("ann"), Ttl::Never).await?;
    println!("   generation {}", users.generation().await?);
    users.flush().await?;
    println!(
        "   ✓ after flush: generation {}, user 42 = {:?}\n",
        users.generation().await?,
        users.get("42").await?
    );

    // 6. Layering and namespacing
    println!("6. Layered + namespaced:");
    let near = LocalCache::new();
    let far = LocalCache::new();
    let layered = NamespaceSuffixCache::new(":v2", LayeredCache::new(near.clone(), far.clone()));
    layered.set("config", json!({"theme": "dark"}), Ttl::Never).await?;
    near.delete("config:v2").await?;
    println!(
        "   ✓ primary evicted, read falls back: {:?}\n",
        layered.get("config").await?
    );

    println!("=== Example Complete ===\n");

    Ok(())
}
