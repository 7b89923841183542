//! Cache Level Traits
//!
//! This module defines the mapping contract shared by every cache level and by
//! the chain that composes them, plus the codec abstraction used to turn typed
//! values into the bytes a level stores.
//!
//! # Architecture
//!
//! - `CacheBackend`: mapping-like contract (get/set/remove/len/keys/clear/stats/hits/reset)
//! - `CacheCodec`: pluggable serialization for typed values
//!
//! # Example: Custom Level
//!
//! ```rust,ignore
//! use cache_chain::{CacheBackend, CacheError, KeyStream, Result, StatsSnapshot, async_trait};
//!
//! struct MyLevel {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl CacheBackend for MyLevel {
//!     async fn get(&self, key: &str) -> Result<Vec<u8>> {
//!         // Return CacheError::NotFound when the key is absent
//!     }
//!
//!     async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
//!         // Your implementation
//!     }
//!
//!     // ... remove, len, keys, clear, stats, hits, reset
//! }
//! ```

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::error::{CacheError, Result};

/// Opaque, backend-specific statistics snapshot.
///
/// Single-level in-memory caches report `{"type": 1, "reads", "hits", ...}`;
/// chains report `{"type": "multi", "cache1": {...}, ...}`; the Redis level
/// reports server counters without a `type` field.
pub type StatsSnapshot = serde_json::Map<String, serde_json::Value>;

/// `type` discriminator carried by single-level snapshots that take part in
/// aggregate hit ratios
pub const SINGLE_LEVEL_STATS_TYPE: u64 = 1;

/// `type` discriminator carried by chain snapshots
pub const MULTI_LEVEL_STATS_TYPE: &str = "multi";

/// Lazy stream of keys; finite, and every call to `keys()` starts a fresh walk
pub type KeyStream<'a> = BoxStream<'a, Result<String>>;

/// Trait for cache value serialization/deserialization
///
/// The memoizer uses a codec to store arbitrary `Serialize` results as bytes
/// in any level.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access across async tasks.
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented by this codec.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> AnyResult<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid encoding of `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> AnyResult<T>;

    /// Name of the codec, for logging
    fn name(&self) -> &'static str;
}

/// Mapping contract implemented by every cache level and by [`CacheChain`](crate::CacheChain)
///
/// # Error Semantics
///
/// - `get`/`remove` signal absence with [`CacheError::NotFound`]. That signal is
///   never treated as a failure by the chain.
/// - Every other error is a backend failure and is subject to the chain's
///   resilience policy.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The chain performs no locking of its
/// own, so each level is responsible for its own concurrency safety.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Get the value stored under `key`
    ///
    /// # Errors
    ///
    /// `NotFound` when the key is absent or expired, any other variant on failure.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the level cannot store the value (including `ValueTooLarge`).
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove `key`
    ///
    /// # Errors
    ///
    /// `NotFound` when the key was absent, any other variant on failure.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Number of entries currently held
    ///
    /// # Errors
    ///
    /// Returns an error if the level cannot be queried.
    async fn len(&self) -> Result<usize>;

    /// Check if the level holds no entries
    ///
    /// # Errors
    ///
    /// Returns an error if the level cannot be queried.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Lazily iterate over the keys currently held
    fn keys(&self) -> KeyStream<'_>;

    /// Remove every entry
    ///
    /// # Errors
    ///
    /// Returns an error if the level cannot be cleared.
    async fn clear(&self) -> Result<()>;

    /// Backend-specific statistics snapshot
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be collected.
    async fn stats(&self) -> Result<StatsSnapshot>;

    /// Hit ratio in `[0, 1]`, or `None` when there is no read data yet
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be collected.
    async fn hits(&self) -> Result<Option<f64>>;

    /// Zero the backend-specific counters (never drops entries)
    ///
    /// # Errors
    ///
    /// Returns an error if the counters cannot be reset.
    async fn reset(&self) -> Result<()>;

    /// Check if the level is operational
    ///
    /// The default implementation writes, reads back and removes a probe key.
    async fn health_check(&self) -> bool {
        let test_key = format!("health_check_{}", self.name().to_lowercase());
        let test_value = b"health_check_value";

        match self.set(&test_key, test_value).await {
            Ok(()) => match self.get(&test_key).await {
                Ok(retrieved) => {
                    let _ = self.remove(&test_key).await;
                    retrieved == test_value
                }
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    /// Name of this level, for logging (e.g. "Moka", "Redis", "Chain")
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// Turn a miss reported by `Option` into the `NotFound` signal
pub(crate) fn found(key: &str, value: Option<Vec<u8>>) -> Result<Vec<u8>> {
    value.ok_or_else(|| CacheError::not_found(key))
}
