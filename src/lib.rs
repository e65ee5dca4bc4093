//! # casket
//!
//! A backend-agnostic key-value cache contract with optimistic updates.
//!
//! ## Features
//!
//! - **One Contract:** every store, adapter and decorator implements [`CacheBackend`]
//! - **Backends:** in-process [`backend::LocalCache`], Memcached and Redis adapters
//! - **Optimistic Updates:** `get_for_update` / `set_if_same` with opaque tokens,
//!   plus a retrying [`OptimisticUpdate`] builder
//! - **Decorators:** [`LayeredCache`], [`NamespaceSuffixCache`] and
//!   generation-scoped [`GroupCache`]
//! - **Consistent Errors:** remote statuses mapped onto one [`Error`] taxonomy
//!
//! ## Quick Start
//!
//! ```
//! use casket::{backend::LocalCache, json, BaseCache, CacheBackend, GroupCache, Ttl};
//!
//! # async fn example() -> casket::Result<()> {
//! let cache = LocalCache::new();
//!
//! // 1. Plain key-value access
//! cache.set("motd", json!("hello"), Ttl::from_secs(60)).await?;
//!
//! // 2. Compute on miss
//! let total = cache
//!     .get_or_yield("stats:total", Ttl::from_secs(300), || async { Ok(json!(1234)) })
//!     .await?;
//!
//! // 3. Race-free read-modify-write
//! cache
//!     .optimistic("visits")
//!     .apply(|current| json!(current.and_then(|v| v.as_i64()).unwrap_or(0) + 1))
//!     .await?;
//!
//! // 4. Invalidate a whole group at once
//! let users = GroupCache::new("users", cache.clone())?;
//! users.set("42", json!({"name": "ann"}), Ttl::Never).await?;
//! users.flush().await?;
//! # let _ = total;
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod base;
pub mod builder;
pub mod decorator;
pub mod error;
pub mod handle;
pub mod key;
pub mod result;
pub mod serialization;
pub mod ttl;
pub mod value;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use base::BaseCache;
pub use builder::{OptimisticUpdate, MAX_BACKOFF};
pub use decorator::{GroupCache, LayeredCache, NamespaceSuffixCache};
pub use error::{Error, Result};
pub use handle::ValueHandle;
pub use result::{CacheResult, ValidationToken};
pub use serde_json::json;
pub use ttl::Ttl;
pub use value::Value;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
