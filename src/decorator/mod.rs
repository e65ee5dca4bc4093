//! Caches that wrap other caches.
//!
//! Decorators implement [`CacheBackend`](crate::backend::CacheBackend)
//! themselves, so they nest freely. They own a handle to the inner cache (a
//! clone, or a `&B` borrow) and never manage its connections. Inner errors
//! are propagated unchanged.

pub mod group;
pub mod layered;
pub mod suffix;

pub use group::GroupCache;
pub use layered::LayeredCache;
pub use suffix::NamespaceSuffixCache;
