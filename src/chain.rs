//! Cache Chain - Multi-Level Cache Composition
//!
//! Composes two or more cache levels behind the same [`CacheBackend`] contract.
//!
//! ```text
//! get:    level 0 → level 1 → ... → level N-1
//!         hit at level i ⇒ write (key, value) into levels 0..i (promotion)
//! set:    every level, in priority order
//! remove: every level, in priority order ("not found" is skipped)
//! ```
//!
//! # Resilience
//!
//! A non-resilient chain fails fast: the first failure other than "not found"
//! aborts the operation and is returned unchanged. A resilient chain logs the
//! failure at debug level, remembers it and moves on to the next level; once
//! every level has been visited the last remembered failure is returned, so
//! failures are bypassed but never silently lost.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CacheError, Result};
use crate::stats::aggregate_hit_ratio;
use crate::traits::{CacheBackend, KeyStream, MULTI_LEVEL_STATS_TYPE, StatsSnapshot};

/// Minimum number of levels a chain must hold
pub const MIN_LEVELS: usize = 2;

/// Last soft failure seen during one chain operation
///
/// Lives for a single call; nothing is shared between operations.
struct FailureTracker<'a> {
    operation: &'static str,
    key: &'a str,
    resilient: bool,
    last: Option<CacheError>,
}

impl<'a> FailureTracker<'a> {
    fn new(operation: &'static str, key: &'a str, resilient: bool) -> Self {
        Self {
            operation,
            key,
            resilient,
            last: None,
        }
    }

    /// Record a level failure, or hand it back when the chain is not resilient
    fn absorb(&mut self, level: usize, error: CacheError) -> Result<()> {
        if !self.resilient {
            return Err(error);
        }
        debug!(
            operation = self.operation,
            key = %self.key,
            level = level,
            error = %error,
            "[Chain] Level failure bypassed"
        );
        self.last = Some(error);
        Ok(())
    }

    fn finish(self) -> Result<()> {
        match self.last {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Ordered multi-level cache with promotion-on-hit
///
/// Level 0 has the highest priority: it is checked first and receives
/// promoted values. The chain shares ownership of its levels, which may be
/// used by other consumers at the same time, and never adds or removes levels
/// after construction.
///
/// # Example
///
/// ```rust
/// use cache_chain::{CacheBackend, CacheChain, DashMapCache};
/// use std::sync::Arc;
///
/// # async fn example() -> cache_chain::Result<()> {
/// let hot = Arc::new(DashMapCache::new());
/// let warm = Arc::new(DashMapCache::new());
/// let chain = CacheChain::new(vec![hot.clone() as Arc<dyn CacheBackend>, warm.clone()], false)?;
///
/// warm.set("user:1", b"alice").await?;
/// assert_eq!(chain.get("user:1").await?, b"alice".to_vec());
/// // promoted into the hot level
/// assert_eq!(hot.get("user:1").await?, b"alice".to_vec());
/// # Ok(())
/// # }
/// ```
pub struct CacheChain {
    levels: Vec<Arc<dyn CacheBackend>>,
    resilient: bool,
}

impl CacheChain {
    /// Create a chain over `levels`, ordered by priority
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when fewer than two levels are supplied.
    pub fn new(levels: Vec<Arc<dyn CacheBackend>>, resilient: bool) -> Result<Self> {
        if levels.len() < MIN_LEVELS {
            return Err(CacheError::invalid_configuration(format!(
                "cache chain requires at least {MIN_LEVELS} levels, got {}",
                levels.len()
            )));
        }

        info!(
            levels = levels.len(),
            resilient = resilient,
            backends = ?levels.iter().map(|level| level.name()).collect::<Vec<_>>(),
            "Cache chain initialized"
        );

        Ok(Self { levels, resilient })
    }

    /// Levels in priority order
    pub fn levels(&self) -> &[Arc<dyn CacheBackend>] {
        &self.levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_resilient(&self) -> bool {
        self.resilient
    }

    /// Highest-priority level, the chain's working-set view for `len`/`keys`
    #[allow(clippy::indexing_slicing)] // `new` guarantees at least two levels
    fn primary(&self) -> &Arc<dyn CacheBackend> {
        &self.levels[0]
    }

    /// Copy a value found at `found_at` into every higher-priority level
    ///
    /// Never fails the surrounding `get`: resilient chains keep promoting past a
    /// failed level, non-resilient chains stop at the first failure.
    async fn promote(&self, key: &str, value: &[u8], found_at: usize) {
        for (index, level) in self.levels.iter().take(found_at).enumerate() {
            match level.set(key, value).await {
                Ok(()) => {
                    debug!(key = %key, from = found_at, to = index, "[Chain] Promoted key");
                }
                Err(error) if self.resilient => {
                    debug!(key = %key, level = index, error = %error, "[Chain] Promotion failed, continuing");
                }
                Err(error) => {
                    warn!(key = %key, level = index, error = %error, "[Chain] Promotion failed, remaining levels skipped");
                    break;
                }
            }
        }
    }
}

impl fmt::Debug for CacheChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheChain")
            .field(
                "levels",
                &self.levels.iter().map(|level| level.name()).collect::<Vec<_>>(),
            )
            .field("resilient", &self.resilient)
            .finish()
    }
}

#[async_trait]
impl CacheBackend for CacheChain {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut failures = FailureTracker::new("get", key, self.resilient);

        for (index, level) in self.levels.iter().enumerate() {
            match level.get(key).await {
                Ok(value) => {
                    debug!(key = %key, level = index, "[Chain] Hit");
                    self.promote(key, &value, index).await;
                    return Ok(value);
                }
                Err(error) if error.is_not_found() => {}
                Err(error) => failures.absorb(index, error)?,
            }
        }

        failures.finish()?;
        Err(CacheError::not_found(key))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut failures = FailureTracker::new("set", key, self.resilient);

        for (index, level) in self.levels.iter().enumerate() {
            if let Err(error) = level.set(key, value).await {
                failures.absorb(index, error)?;
            }
        }

        failures.finish()
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut failures = FailureTracker::new("remove", key, self.resilient);

        for (index, level) in self.levels.iter().enumerate() {
            match level.remove(key).await {
                Ok(()) => {}
                Err(error) if error.is_not_found() => {}
                Err(error) => failures.absorb(index, error)?,
            }
        }

        failures.finish()
    }

    async fn len(&self) -> Result<usize> {
        self.primary().len().await
    }

    fn keys(&self) -> KeyStream<'_> {
        self.primary().keys()
    }

    async fn clear(&self) -> Result<()> {
        for level in &self.levels {
            level.clear().await?;
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        let mut snapshot = StatsSnapshot::new();
        snapshot.insert(
            "type".to_string(),
            Value::String(MULTI_LEVEL_STATS_TYPE.to_string()),
        );

        for (index, level) in self.levels.iter().enumerate() {
            let level_stats = level.stats().await.unwrap_or_else(|error| {
                debug!(level = index, error = %error, "[Chain] Level stats unavailable");
                StatsSnapshot::new()
            });
            snapshot.insert(format!("cache{}", index + 1), Value::Object(level_stats));
        }

        Ok(snapshot)
    }

    async fn hits(&self) -> Result<Option<f64>> {
        let snapshot = self.stats().await?;
        Ok(aggregate_hit_ratio(&snapshot))
    }

    async fn reset(&self) -> Result<()> {
        for (index, level) in self.levels.iter().enumerate() {
            if let Err(error) = level.reset().await {
                debug!(level = index, error = %error, "[Chain] Level reset failed, continuing");
            }
        }
        Ok(())
    }

    /// Healthy when the highest-priority level is healthy; lower levels are
    /// allowed to degrade.
    async fn health_check(&self) -> bool {
        let mut results = Vec::with_capacity(self.levels.len());
        for level in &self.levels {
            results.push(level.health_check().await);
        }

        let primary_ok = results.first().copied().unwrap_or(false);
        if results.iter().all(|ok| *ok) {
            info!("Cache chain health check passed");
        } else {
            warn!(levels = ?results, "Cache chain health check - partial failure");
        }
        primary_ok
    }

    fn name(&self) -> &'static str {
        "Chain"
    }
}
