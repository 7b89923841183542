//! Moka Cache - Bounded In-Memory Level
//!
//! High-performance in-memory cache using Moka for hot data storage.

use async_trait::async_trait;
use futures_util::stream;
use moka::future::Cache;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::stats::LevelCounters;
use crate::traits::{CacheBackend, KeyStream, StatsSnapshot, found};

/// Configuration for `MokaCache`
#[derive(Debug, Clone, Copy)]
pub struct MokaCacheConfig {
    /// Max capacity of the cache
    pub max_capacity: u64,
    /// Time to live for cache entries
    pub time_to_live: Duration,
    /// Time to idle for cache entries
    pub time_to_idle: Duration,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 2000,
            time_to_live: Duration::from_secs(3600),
            time_to_idle: Duration::from_secs(120),
        }
    }
}

/// Moka in-memory cache
///
/// This is the default level 0 (hot tier) of [`CacheSystem`](crate::CacheSystem), providing:
/// - Fast in-memory access (< 1ms latency)
/// - Bounded size with TinyLFU eviction
/// - Cache-wide time-to-live and time-to-idle
/// - Single-level statistics (`type: 1`)
pub struct MokaCache {
    cache: Cache<String, Vec<u8>>,
    max_capacity: u64,
    counters: LevelCounters,
}

impl MokaCache {
    /// Create new Moka cache
    pub fn new(config: MokaCacheConfig) -> Self {
        info!("Initializing Moka Cache");

        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .time_to_idle(config.time_to_idle)
            .build();

        info!(
            capacity = config.max_capacity,
            ttl_secs = config.time_to_live.as_secs(),
            "Moka Cache initialized"
        );

        Self {
            cache,
            max_capacity: config.max_capacity,
            counters: LevelCounters::new(),
        }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(MokaCacheConfig::default())
    }
}

#[async_trait]
impl CacheBackend for MokaCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value = self.cache.get(key).await;
        if value.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        found(key, value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.cache.insert(key.to_string(), value.to_vec()).await;
        self.counters.record_set();
        debug!(key = %key, "[Moka] Cached key");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        found(key, self.cache.remove(key).await).map(|_| ())
    }

    async fn len(&self) -> Result<usize> {
        // apply pending evictions first; iteration also skips expired entries
        self.cache.run_pending_tasks().await;
        Ok(self.cache.iter().count())
    }

    fn keys(&self) -> KeyStream<'_> {
        let keys: Vec<_> = self
            .cache
            .iter()
            .map(|(key, _)| Ok(key.as_ref().clone()))
            .collect();
        Box::pin(stream::iter(keys))
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        let size = self.len().await?;
        Ok(self.counters.snapshot(size, Some(self.max_capacity)))
    }

    async fn hits(&self) -> Result<Option<f64>> {
        Ok(self.counters.hit_ratio())
    }

    async fn reset(&self) -> Result<()> {
        self.counters.reset();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Moka"
    }
}
