//! `DashMap` Cache - Simple Concurrent `HashMap` Level
//!
//! A lightweight in-memory level using `DashMap` for concurrent access.
//! Unbounded, with an optional default TTL applied to every write.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::Result;
use crate::stats::LevelCounters;
use crate::traits::{CacheBackend, KeyStream, StatsSnapshot, found};

/// Cache entry with expiration tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() > expires_at)
    }
}

/// Simple concurrent cache using `DashMap`
///
/// **Features**:
/// - Lock-free concurrent reads/writes
/// - Optional default TTL, checked lazily on read
/// - Single-level statistics (`type: 1`)
///
/// **Limitations**:
/// - No eviction policy and no size limit
/// - Expired entries linger until read or [`cleanup_expired`](Self::cleanup_expired)
///
/// **Example**:
/// ```rust
/// use cache_chain::backends::DashMapCache;
/// use cache_chain::traits::CacheBackend;
///
/// # async fn example() -> cache_chain::Result<()> {
/// let cache = DashMapCache::new();
///
/// cache.set("user:1", b"alice").await?;
/// assert_eq!(cache.get("user:1").await?, b"alice".to_vec());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct DashMapCache {
    map: DashMap<String, CacheEntry>,
    ttl: Option<Duration>,
    counters: LevelCounters,
}

impl DashMapCache {
    /// Create a `DashMap` cache whose entries never expire
    pub fn new() -> Self {
        info!("Initializing DashMap Cache (concurrent HashMap)");

        Self {
            map: DashMap::new(),
            ttl: None,
            counters: LevelCounters::new(),
        }
    }

    /// Create a `DashMap` cache expiring every entry `ttl` after its write
    pub fn with_ttl(ttl: Duration) -> Self {
        info!(ttl_secs = ttl.as_secs(), "Initializing DashMap Cache with default TTL");

        Self {
            map: DashMap::new(),
            ttl: Some(ttl),
            counters: LevelCounters::new(),
        }
    }

    /// Drop `key` only if the stored entry is still expired
    ///
    /// A `set` racing with an expired read replaces the entry first, and the
    /// fresh value then survives.
    fn evict_if_expired(&self, key: &str) -> bool {
        self.map
            .remove_if(key, |_, entry| entry.is_expired())
            .is_some()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0;
        self.map.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(count = removed, "[DashMap] Cleaned up expired entries");
        }
        removed
    }
}

impl Default for DashMapCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for DashMapCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let value = match self.map.get(key) {
            Some(entry) if entry.is_expired() => {
                drop(entry); // release the shard read lock before removing
                self.evict_if_expired(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        };

        if value.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        found(key, value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.map
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), self.ttl));
        self.counters.record_set();
        debug!(key = %key, "[DashMap] Cached key");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let removed = self.map.remove(key).filter(|(_, entry)| !entry.is_expired());
        found(key, removed.map(|(_, entry)| entry.value)).map(|_| ())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.map.iter().filter(|entry| !entry.is_expired()).count())
    }

    fn keys(&self) -> KeyStream<'_> {
        let keys: Vec<_> = self
            .map
            .iter()
            .filter(|entry| !entry.is_expired())
            .map(|entry| Ok(entry.key().clone()))
            .collect();
        Box::pin(stream::iter(keys))
    }

    async fn clear(&self) -> Result<()> {
        self.map.clear();
        Ok(())
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        Ok(self.counters.snapshot(self.len().await?, None))
    }

    async fn hits(&self) -> Result<Option<f64>> {
        Ok(self.counters.hit_ratio())
    }

    async fn reset(&self) -> Result<()> {
        self.counters.reset();
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DashMap"
    }
}
