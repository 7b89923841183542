//! Cache Chain
//!
//! A layered caching library for Rust featuring:
//! - **Cache Chain**: ordered multi-level cache with promotion-on-hit
//! - **Resilient Fan-Out**: per-level failures bypassed, the last one still surfaced
//! - **In-Memory Levels**: Moka (bounded) and `DashMap` (unbounded)
//! - **Redis Level**: remote backing store with per-key expiry and key namespacing
//! - **Memoizer**: function result caching over any level or chain
//! - **Aggregated Statistics**: per-level snapshots and a cross-level hit ratio
//!
//! # Quick Start
//!
//! ```rust
//! use cache_chain::{CacheBackend, ChainBuilder, DashMapCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> cache_chain::Result<()> {
//!     let hot = Arc::new(DashMapCache::new());
//!     let warm = Arc::new(DashMapCache::new());
//!     let chain = ChainBuilder::new()
//!         .with_level(hot.clone())
//!         .with_level(warm.clone())
//!         .resilient(true)
//!         .build()?;
//!
//!     warm.set("user:1", br#"{"name":"alice"}"#).await?;
//!
//!     // Level 0 misses, level 1 hits and the value is promoted into level 0
//!     let bytes = chain.get("user:1").await?;
//!     assert_eq!(hot.get("user:1").await?, bytes);
//!
//!     if let Some(ratio) = chain.hits().await? {
//!         tracing::info!("Hit rate: {:.2}%", ratio * 100.0);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! With the default `moka` and `redis` features, `CacheSystem::new()` builds a
//! ready-made Moka → Redis chain configured from the environment.
//!
//! # Architecture
//!
//! ```text
//! Memoizer → CacheChain → level 0 (Moka) → level 1 (Redis) → ... → level N-1
//!                          ↓ Hit            ↓ Hit
//!                          Return           Promote into levels 0..i, return
//! ```

pub mod backends;
pub mod builder;
pub mod chain;
pub mod codecs;
pub mod error;
pub mod memoize;
pub mod stats;
pub mod traits;

pub use backends::DashMapCache;

#[cfg(feature = "moka")]
pub use backends::{MokaCache, MokaCacheConfig};

#[cfg(feature = "redis")]
pub use backends::{RedisCache, RedisCacheConfig};

pub use builder::ChainBuilder;
pub use chain::CacheChain;
pub use codecs::JsonCodec;
pub use error::{CacheError, Result};
pub use memoize::{CacheInfo, FunctionId, KeyStrategy, Memoizer};
pub use stats::{LevelCounters, aggregate_hit_ratio};
pub use traits::{
    CacheBackend, CacheCodec, KeyStream, MULTI_LEVEL_STATS_TYPE, SINGLE_LEVEL_STATS_TYPE,
    StatsSnapshot,
};

// Re-export async_trait for user convenience
pub use async_trait::async_trait;

#[cfg(all(feature = "moka", feature = "redis"))]
pub use system::CacheSystem;

#[cfg(all(feature = "moka", feature = "redis"))]
mod system {
    use std::sync::Arc;
    use tracing::info;

    use crate::backends::{MokaCache, MokaCacheConfig, RedisCache, RedisCacheConfig};
    use crate::builder::ChainBuilder;
    use crate::chain::CacheChain;
    use crate::error::Result;
    use crate::traits::CacheBackend;

    /// Ready-made two-level cache: Moka (level 0) in front of Redis (level 1)
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use cache_chain::CacheSystem;
    ///
    /// #[tokio::main]
    /// async fn main() -> cache_chain::Result<()> {
    ///     let cache = CacheSystem::new().await?;
    ///
    ///     // Use the chain for all operations
    ///     let chain = cache.chain();
    ///
    ///     Ok(())
    /// }
    /// ```
    #[derive(Clone)]
    pub struct CacheSystem {
        /// Chain over both levels (primary interface)
        pub chain: Arc<CacheChain>,
        /// Level 0, in-memory
        pub memory: Arc<MokaCache>,
        /// Level 1, Redis
        pub remote: Arc<RedisCache>,
    }

    impl CacheSystem {
        /// Create new cache system with default configuration
        ///
        /// # Configuration
        ///
        /// Redis is configured from `REDIS_URL`, `CACHE_TTL_SECS` and
        /// `CACHE_PREFIX`. Default: `redis://127.0.0.1:6379`, 600s expiry, no prefix.
        /// The chain is resilient, so a Redis outage degrades to level 0 only.
        ///
        /// # Errors
        ///
        /// Returns an error if the configuration is invalid or Redis is unreachable.
        pub async fn new() -> Result<Self> {
            Self::with_config(MokaCacheConfig::default(), RedisCacheConfig::from_env()?, true).await
        }

        /// Create cache system with custom Redis URL
        ///
        /// # Errors
        ///
        /// Returns an error if the URL is invalid or Redis is unreachable.
        pub async fn with_redis_url(redis_url: &str) -> Result<Self> {
            info!(redis_url = %redis_url, "Initializing Cache System with custom Redis URL");
            Self::with_config(MokaCacheConfig::default(), RedisCacheConfig::with_url(redis_url), true).await
        }

        /// Create cache system from explicit level configurations
        ///
        /// # Errors
        ///
        /// Returns an error if the Redis configuration is invalid or Redis is unreachable.
        pub async fn with_config(memory: MokaCacheConfig, remote: RedisCacheConfig, resilient: bool) -> Result<Self> {
            info!("Initializing Cache System");

            let memory = Arc::new(MokaCache::new(memory));
            let remote = Arc::new(RedisCache::with_config(remote).await?);

            let chain = ChainBuilder::new()
                .with_level(memory.clone())
                .with_level(remote.clone())
                .resilient(resilient)
                .build()?;

            info!("Cache System initialized successfully");

            Ok(Self {
                chain: Arc::new(chain),
                memory,
                remote,
            })
        }

        /// Perform health check on both levels
        ///
        /// Returns `true` if at least level 0 is operational.
        /// A Redis failure is tolerated (graceful degradation).
        pub async fn health_check(&self) -> bool {
            self.chain.health_check().await
        }

        /// Chain over both levels (primary interface)
        pub fn chain(&self) -> &Arc<CacheChain> {
            &self.chain
        }
    }
}
