//! Integration tests for the Memoizer
//!
//! These tests verify:
//! - Cached results are returned without recomputing
//! - Key strategies and prefixes
//! - Lock scoping around cache reads and writes
//! - Error propagation from compute and from the cache
//! - Memoizing over a chain

mod common;

use cache_chain::{
    CacheBackend, CacheError, CacheInfo, DashMapCache, FunctionId, KeyStream, KeyStrategy,
    Memoizer, Result, StatsSnapshot, async_trait, function_id,
};
use common::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

const SQUARE: FunctionId = FunctionId::new("tests::math", "square");

#[derive(Debug)]
enum AppError {
    Cache(CacheError),
    Compute(String),
}

impl From<CacheError> for AppError {
    fn from(error: CacheError) -> Self {
        Self::Cache(error)
    }
}

/// Level that accepts no value at all
#[derive(Default)]
struct ZeroCapacityLevel {
    inner: DashMapCache,
}

#[async_trait]
impl CacheBackend for ZeroCapacityLevel {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        Err(CacheError::ValueTooLarge {
            key: key.to_string(),
            size: value.len(),
            limit: 0,
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn len(&self) -> Result<usize> {
        self.inner.len().await
    }

    fn keys(&self) -> KeyStream<'_> {
        self.inner.keys()
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        self.inner.stats().await
    }

    async fn hits(&self) -> Result<Option<f64>> {
        self.inner.hits().await
    }

    async fn reset(&self) -> Result<()> {
        self.inner.reset().await
    }
}

async fn square(memo: &Memoizer, calls: &AtomicUsize, n: u64) -> std::result::Result<u64, CacheError> {
    memo.get_or_compute(&SQUARE, &(n,), || async {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(n * n)
    })
    .await
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    init_tracing();
    let memo = Memoizer::new(Arc::new(DashMapCache::new())).with_info(true);
    let calls = AtomicUsize::new(0);

    assert_eq!(square(&memo, &calls, 4).await.unwrap(), 16);
    assert_eq!(square(&memo, &calls, 4).await.unwrap(), 16);
    assert_eq!(square(&memo, &calls, 5).await.unwrap(), 25);

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        memo.cache_info().await.unwrap(),
        Some(CacheInfo {
            hits: 1,
            misses: 2,
            maxsize: None,
            currsize: 2
        })
    );
}

#[tokio::test]
async fn test_cache_info_disabled_by_default() {
    let memo = Memoizer::new(Arc::new(DashMapCache::new()));
    let calls = AtomicUsize::new(0);
    square(&memo, &calls, 2).await.unwrap();
    assert_eq!(memo.cache_info().await.unwrap(), None);
}

#[tokio::test]
async fn test_cache_clear_empties_cache_and_counters() {
    let memo = Memoizer::new(Arc::new(DashMapCache::new())).with_info(true);
    let calls = AtomicUsize::new(0);
    square(&memo, &calls, 3).await.unwrap();
    square(&memo, &calls, 3).await.unwrap();

    memo.cache_clear().await.unwrap();

    assert_eq!(
        memo.cache_info().await.unwrap(),
        Some(CacheInfo {
            hits: 0,
            misses: 0,
            maxsize: None,
            currsize: 0
        })
    );
    square(&memo, &calls, 3).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_values_are_stored_as_json_under_prefixed_keys() {
    let cache = Arc::new(DashMapCache::new());
    let memo = Memoizer::new(cache.clone()).with_prefix("users");

    let name: String = memo
        .get_or_compute(&function_id!(load_user), &(42,), || async {
            Ok::<_, CacheError>("alice".to_string())
        })
        .await
        .unwrap();

    assert_eq!(name, "alice");
    assert_eq!(cache.get("users:[42]").await.unwrap(), br#""alice""#.to_vec());
}

#[tokio::test]
async fn test_key_strategies_and_prefix() {
    let cache = Arc::new(DashMapCache::new());

    let qualified = Memoizer::new(cache.clone()).with_key_strategy(KeyStrategy::Qualified);
    assert_eq!(qualified.make_key(&SQUARE, &(7,)).unwrap(), ":tests::math::square:[7]");

    let fixed = Memoizer::new(cache.clone())
        .with_key_strategy(KeyStrategy::Fixed("all".into()))
        .with_prefix("app:");
    assert_eq!(fixed.make_key(&SQUARE, &(7,)).unwrap(), "app:all");

    let custom = Memoizer::new(cache.clone()).with_key_strategy(KeyStrategy::Custom(Arc::new(
        |function: &FunctionId, args: &str| format!("{}-{}", function.name, args.len()),
    )));
    assert_eq!(custom.make_key(&SQUARE, &(7,)).unwrap(), ":square-3");

    let unprefixed = Memoizer::new(cache).with_prefix("");
    assert_eq!(unprefixed.make_key(&SQUARE, &(7, "x")).unwrap(), r#":[7,"x"]"#);
}

#[tokio::test]
async fn test_fixed_key_shares_one_entry() {
    let memo = Memoizer::new(Arc::new(DashMapCache::new()))
        .with_key_strategy(KeyStrategy::Fixed("answer".into()));
    let calls = AtomicUsize::new(0);

    assert_eq!(square(&memo, &calls, 2).await.unwrap(), 4);
    // different arguments, same key: the first result is returned
    assert_eq!(square(&memo, &calls, 9).await.unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lock_not_held_while_computing() {
    let lock = Arc::new(Mutex::new(()));
    let memo = Memoizer::new(Arc::new(DashMapCache::new())).with_lock(lock.clone());

    let value: u64 = memo
        .get_or_compute(&SQUARE, &(6,), || {
            let free = lock.try_lock().is_ok();
            async move {
                assert!(free, "lock held during compute");
                Ok::<_, CacheError>(36)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 36);
    assert!(lock.try_lock().is_ok());
}

#[tokio::test]
async fn test_compute_error_is_returned_and_lock_released() {
    let lock = Arc::new(Mutex::new(()));
    let cache = Arc::new(DashMapCache::new());
    let memo = Memoizer::new(cache.clone()).with_lock(lock.clone());

    let result: std::result::Result<u64, AppError> = memo
        .get_or_compute(&SQUARE, &(1,), || async { Err(AppError::Compute("boom".into())) })
        .await;

    assert!(matches!(result, Err(AppError::Compute(message)) if message == "boom"));
    assert!(lock.try_lock().is_ok());
    assert_eq!(cache.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_oversized_result_is_returned_uncached() {
    let memo = Memoizer::new(Arc::new(ZeroCapacityLevel::default()));
    let calls = AtomicUsize::new(0);

    assert_eq!(square(&memo, &calls, 3).await.unwrap(), 9);
    assert_eq!(square(&memo, &calls, 3).await.unwrap(), 9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cache_read_failure_propagates_without_computing() {
    let level = ScriptedLevel::new();
    level.fail(Op::Get);
    let memo = Memoizer::new(level.clone());
    let calls = AtomicUsize::new(0);

    let result: std::result::Result<u64, AppError> = memo
        .get_or_compute(&SQUARE, &(2,), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(4)
        })
        .await;

    assert!(matches!(result, Err(AppError::Cache(ref e)) if is_backend_failure(e)));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cache_write_failure_propagates() {
    let level = ScriptedLevel::new();
    level.fail(Op::Set);
    let memo = Memoizer::new(level.clone());
    let calls = AtomicUsize::new(0);

    let error = square(&memo, &calls, 2).await.unwrap_err();
    assert!(is_backend_failure(&error));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_undecodable_entry_is_recomputed() {
    let cache = Arc::new(DashMapCache::new());
    let memo = Memoizer::new(cache.clone());
    let key = memo.make_key(&SQUARE, &(8,)).unwrap();
    cache.set(&key, b"not json").await.unwrap();
    let calls = AtomicUsize::new(0);

    assert_eq!(square(&memo, &calls, 8).await.unwrap(), 64);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get(&key).await.unwrap(), b"64".to_vec());
}

#[tokio::test]
async fn test_memoize_over_chain() {
    let (chain, first, second) = scripted_chain(true);
    let memo = Memoizer::new(Arc::new(chain));
    let calls = AtomicUsize::new(0);
    let key = memo.make_key(&SQUARE, &(10,)).unwrap();

    assert_eq!(square(&memo, &calls, 10).await.unwrap(), 100);
    assert_eq!(first.peek(&key).await, Some(b"100".to_vec()));
    assert_eq!(second.peek(&key).await, Some(b"100".to_vec()));

    // evicted from the hot level: served from level 1 and promoted back
    first.remove(&key).await.unwrap();
    assert_eq!(square(&memo, &calls, 10).await.unwrap(), 100);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.peek(&key).await, Some(b"100".to_vec()));
}

#[tokio::test]
async fn test_memoize_over_degraded_resilient_chain() {
    let (chain, first, _second) = scripted_chain(true);
    first.fail(Op::Get);
    let memo = Memoizer::new(Arc::new(chain));
    let calls = AtomicUsize::new(0);

    // a level failure surfaces even though the chain bypassed it
    let error = square(&memo, &calls, 3).await.unwrap_err();
    assert!(is_backend_failure(&error));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    first.heal(Op::Get);
    assert_eq!(square(&memo, &calls, 3).await.unwrap(), 9);
}
