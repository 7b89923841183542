//! Cache Level Implementations
//!
//! Single-level caches that can be used on their own or composed into a
//! [`CacheChain`](crate::CacheChain).
//!
//! # Available Backends
//!
//! ## In-Memory
//! - **Moka** - Bounded concurrent cache with automatic eviction (feature: `moka`, default)
//! - **`DashMap`** - Unbounded concurrent `HashMap`-based cache
//!
//! ## Remote
//! - **Redis** - Distributed backing store with per-key expiry (feature: `redis`, default)
//!
//! # Usage
//!
//! ```rust
//! use cache_chain::backends::DashMapCache;
//! use std::time::Duration;
//!
//! let sessions = DashMapCache::with_ttl(Duration::from_secs(30));
//! assert_eq!(sessions.cleanup_expired(), 0);
//! ```
//!
//! `MokaCache::new(MokaCacheConfig::default())` and `RedisCache::new().await?`
//! are available behind their features.

pub mod dashmap_cache;

#[cfg(feature = "moka")]
pub mod moka_cache;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use dashmap_cache::DashMapCache;

#[cfg(feature = "moka")]
pub use moka_cache::{MokaCache, MokaCacheConfig};

#[cfg(feature = "redis")]
pub use redis_cache::{RedisCache, RedisCacheConfig};
