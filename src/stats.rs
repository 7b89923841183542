//! Level statistics
//!
//! Counters shared by the in-memory levels and the aggregation rule the chain
//! uses to compute a hit ratio across levels.

use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::{SINGLE_LEVEL_STATS_TYPE, StatsSnapshot};

/// Atomic read/hit/miss/set counters for a single level
#[derive(Debug, Default)]
pub struct LevelCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

impl LevelCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Every `get` counts as one read
    pub fn reads(&self) -> u64 {
        self.hits() + self.misses()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn sets(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
    }

    /// `hits / reads`, or `None` before the first read
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> Option<f64> {
        let reads = self.reads();
        (reads > 0).then(|| self.hits() as f64 / reads as f64)
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
    }

    /// Single-level snapshot: `{type: 1, reads, hits, misses, sets, size, maxsize}`
    ///
    /// `maxsize` is `null` for unbounded levels.
    pub fn snapshot(&self, size: usize, maxsize: Option<u64>) -> StatsSnapshot {
        let value = json!({
            "type": SINGLE_LEVEL_STATS_TYPE,
            "reads": self.reads(),
            "hits": self.hits(),
            "misses": self.misses(),
            "sets": self.sets(),
            "size": size,
            "maxsize": maxsize,
        });
        match value {
            Value::Object(map) => map,
            _ => StatsSnapshot::new(),
        }
    }
}

/// Aggregate hit ratio over the nested snapshots of a chain snapshot
///
/// Only entries whose `type` equals [`SINGLE_LEVEL_STATS_TYPE`] contribute;
/// everything else (Redis server counters, nested chains, empty entries left by
/// a failed `stats()` call) is skipped. Returns `None` when no qualifying level
/// has any reads.
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_hit_ratio(snapshot: &StatsSnapshot) -> Option<f64> {
    let (reads, hits) = snapshot
        .values()
        .filter_map(Value::as_object)
        .filter(|level| {
            level.get("type").and_then(Value::as_u64) == Some(SINGLE_LEVEL_STATS_TYPE)
        })
        .fold((0_u64, 0_u64), |(reads, hits), level| {
            let level_reads = level.get("reads").and_then(Value::as_u64).unwrap_or(0);
            let level_hits = level.get("hits").and_then(Value::as_u64).unwrap_or(0);
            (reads + level_reads, hits + level_hits)
        });

    (reads > 0).then(|| hits as f64 / reads as f64)
}
