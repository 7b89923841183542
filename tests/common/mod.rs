//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A scripted level that can be told to fail individual operations
//! - A level reporting fixed statistics
//! - Key and chain helpers
//! - Tracing setup

#![allow(dead_code)]

use cache_chain::{
    CacheBackend, CacheChain, CacheError, DashMapCache, KeyStream, Result, StatsSnapshot,
    async_trait,
};
use futures_util::TryStreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

/// Install a tracing subscriber once per test binary (`RUST_LOG` aware)
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Get Redis URL from environment or use default
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

/// Create a test key with unique suffix
pub fn test_key(name: &str) -> String {
    format!("test_{}_{}", name, rand::random::<u32>())
}

/// Operations a [`ScriptedLevel`] can be told to fail
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Get,
    Set,
    Remove,
    Clear,
    Stats,
    Reset,
}

/// In-memory level whose operations can be switched to fail on demand
///
/// Backed by a [`DashMapCache`]; counts calls per operation so tests can
/// check which levels a chain actually consulted.
#[derive(Default)]
pub struct ScriptedLevel {
    inner: DashMapCache,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_remove: AtomicBool,
    fail_clear: AtomicBool,
    fail_stats: AtomicBool,
    fail_reset: AtomicBool,
    fixed_stats: Option<StatsSnapshot>,
    pub get_calls: AtomicUsize,
    pub set_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub reset_calls: AtomicUsize,
}

impl ScriptedLevel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Level whose `stats()` always returns `stats`
    pub fn with_stats(stats: serde_json::Value) -> Arc<Self> {
        let fixed_stats = match stats {
            serde_json::Value::Object(map) => Some(map),
            _ => panic!("stats must be a JSON object"),
        };
        Arc::new(Self {
            fixed_stats,
            ..Self::default()
        })
    }

    fn flag(&self, op: Op) -> &AtomicBool {
        match op {
            Op::Get => &self.fail_get,
            Op::Set => &self.fail_set,
            Op::Remove => &self.fail_remove,
            Op::Clear => &self.fail_clear,
            Op::Stats => &self.fail_stats,
            Op::Reset => &self.fail_reset,
        }
    }

    pub fn fail(&self, op: Op) {
        self.flag(op).store(true, Ordering::SeqCst);
    }

    pub fn heal(&self, op: Op) {
        self.flag(op).store(false, Ordering::SeqCst);
    }

    fn check(&self, op: Op) -> Result<()> {
        if self.flag(op).load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("scripted {op:?} failure").into());
        }
        Ok(())
    }

    /// Read straight from the backing map, bypassing scripted failures
    pub async fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.get(key).await.ok()
    }

    pub async fn put(&self, key: &str, value: &[u8]) {
        self.inner
            .set(key, value)
            .await
            .unwrap_or_else(|_| panic!("in-memory set cannot fail"));
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheBackend for ScriptedLevel {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Get)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Set)?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Remove)?;
        self.inner.remove(key).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    fn keys(&self) -> KeyStream<'_> {
        self.inner.keys()
    }

    async fn clear(&self) -> Result<()> {
        self.check(Op::Clear)?;
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        self.check(Op::Stats)?;
        match &self.fixed_stats {
            Some(stats) => Ok(stats.clone()),
            None => self.inner.stats().await,
        }
    }

    async fn hits(&self) -> Result<Option<f64>> {
        self.inner.hits().await
    }

    async fn reset(&self) -> Result<()> {
        self.reset_calls.fetch_add(1, Ordering::SeqCst);
        self.check(Op::Reset)?;
        self.inner.reset().await
    }

    fn name(&self) -> &'static str {
        "Scripted"
    }
}

/// Two-level chain over scripted levels
pub fn scripted_chain(resilient: bool) -> (CacheChain, Arc<ScriptedLevel>, Arc<ScriptedLevel>) {
    let first = ScriptedLevel::new();
    let second = ScriptedLevel::new();
    let levels: Vec<Arc<dyn CacheBackend>> = vec![first.clone(), second.clone()];
    let chain = CacheChain::new(levels, resilient)
        .unwrap_or_else(|_| panic!("two levels are a valid chain"));
    (chain, first, second)
}

/// Collect every key of a level, sorted
pub async fn collect_keys(level: &dyn CacheBackend) -> Vec<String> {
    let mut keys: Vec<String> = level
        .keys()
        .try_collect()
        .await
        .unwrap_or_else(|_| panic!("key stream failed"));
    keys.sort();
    keys
}

/// `true` if the error is a backend failure (not a miss or a config error)
pub fn is_backend_failure(error: &CacheError) -> bool {
    matches!(error, CacheError::Backend(_))
}
