//! Memoizer - Function Result Caching
//!
//! Caches the results of async computations in any [`CacheBackend`], a single
//! level or a whole [`CacheChain`](crate::CacheChain).
//!
//! ```text
//! get_or_compute(function, args, compute)
//!   key  = prefix (always ending in ':') + KeyStrategy(function, args)
//!   lock → cache.get(key) → unlock ──hit──────────────→ value
//!                 │ NotFound
//!                 ▼
//!              compute()  (outside the lock)
//!                 ▼
//!   lock → cache.set(key) → unlock ─────────────────→ value
//! ```
//!
//! # Example
//!
//! ```rust
//! use cache_chain::{CacheError, DashMapCache, Memoizer, function_id};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), CacheError> {
//! let memo = Memoizer::new(Arc::new(DashMapCache::new())).with_prefix("users");
//!
//! let name: String = memo
//!     .get_or_compute(&function_id!(load_user), &(42,), || async {
//!         Ok::<_, CacheError>("alice".to_string())
//!     })
//!     .await?;
//! assert_eq!(name, "alice");
//! # Ok(())
//! # }
//! ```

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::codecs::JsonCodec;
use crate::error::{CacheError, Result};
use crate::traits::{CacheBackend, CacheCodec};

/// Key prefix used when none is configured
pub const DEFAULT_PREFIX: &str = ":";

/// Identity of a memoized function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId {
    pub module: &'static str,
    pub name: &'static str,
}

impl FunctionId {
    pub const fn new(module: &'static str, name: &'static str) -> Self {
        Self { module, name }
    }

    /// `module::name`
    pub fn qualified_name(&self) -> String {
        format!("{}::{}", self.module, self.name)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Build a [`FunctionId`] for `name` in the calling module
#[macro_export]
macro_rules! function_id {
    ($name:ident) => {
        $crate::memoize::FunctionId::new(module_path!(), stringify!($name))
    };
}

/// Caller-supplied key function: `(function, serialized arguments) -> key`
pub type KeyFn = Arc<dyn Fn(&FunctionId, &str) -> String + Send + Sync>;

/// How a cache key is derived from a call
///
/// Chosen once when the memoizer is built. Arguments are serialized to JSON,
/// so equal arguments always produce the same key.
#[derive(Clone, Default)]
pub enum KeyStrategy {
    /// One fixed key for every call, provided by the function itself
    Fixed(String),
    /// `module::name:<args>`, unique across functions sharing a cache
    Qualified,
    /// Caller-supplied key function
    Custom(KeyFn),
    /// `<args>` only
    #[default]
    Arguments,
}

impl KeyStrategy {
    fn derive(&self, function: &FunctionId, args: &str) -> String {
        match self {
            Self::Fixed(key) => key.clone(),
            Self::Qualified => format!("{function}:{args}"),
            Self::Custom(key_fn) => key_fn(function, args),
            Self::Arguments => args.to_string(),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(key) => f.debug_tuple("Fixed").field(key).finish(),
            Self::Qualified => f.write_str("Qualified"),
            Self::Custom(_) => f.write_str("Custom(..)"),
            Self::Arguments => f.write_str("Arguments"),
        }
    }
}

/// Hit/miss counters of a memoizer, with the current size of its cache
///
/// `maxsize` is always `None`: the bound, if any, belongs to the cache levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    pub hits: u64,
    pub misses: u64,
    pub maxsize: Option<usize>,
    pub currsize: usize,
}

/// Memoizing wrapper around a cache
pub struct Memoizer<C: CacheCodec = JsonCodec> {
    cache: Arc<dyn CacheBackend>,
    strategy: KeyStrategy,
    lock: Option<Arc<Mutex<()>>>,
    prefix: String,
    info: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    codec: C,
}

impl Memoizer<JsonCodec> {
    /// Memoize into `cache` with JSON encoding, argument keys, the `:` prefix
    /// and no lock
    pub fn new(cache: Arc<dyn CacheBackend>) -> Self {
        Self {
            cache,
            strategy: KeyStrategy::default(),
            lock: None,
            prefix: DEFAULT_PREFIX.to_string(),
            info: false,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            codec: JsonCodec,
        }
    }
}

impl<C: CacheCodec> Memoizer<C> {
    #[must_use]
    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Serialize cache reads and writes of this process through `lock`
    #[must_use]
    pub fn with_lock(mut self, lock: Arc<Mutex<()>>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Namespace every key; a trailing `:` is added when missing, so the
    /// empty prefix becomes `:`
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let mut prefix = prefix.into();
        if !prefix.ends_with(':') {
            prefix.push(':');
        }
        self.prefix = prefix;
        self
    }

    /// Track hits and misses for [`cache_info`](Self::cache_info)
    #[must_use]
    pub fn with_info(mut self, info: bool) -> Self {
        self.info = info;
        self
    }

    /// Swap the value codec
    pub fn with_codec<D: CacheCodec>(self, codec: D) -> Memoizer<D> {
        Memoizer {
            cache: self.cache,
            strategy: self.strategy,
            lock: self.lock,
            prefix: self.prefix,
            info: self.info,
            hits: self.hits,
            misses: self.misses,
            codec,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheBackend> {
        &self.cache
    }

    /// Cache key for a call of `function` with `args`
    ///
    /// # Errors
    ///
    /// Returns a backend error if the arguments cannot be serialized.
    pub fn make_key<A: Serialize + ?Sized>(&self, function: &FunctionId, args: &A) -> Result<String> {
        let args = serde_json::to_string(args)
            .map_err(|e| anyhow::anyhow!("Failed to serialize arguments of {function}: {e}"))?;
        Ok(format!("{}{}", self.prefix, self.strategy.derive(function, &args)))
    }

    /// Return the cached result of `function(args)`, computing and caching it on a miss
    ///
    /// The optional lock is held around the cache read and around the cache
    /// write, never while `compute` runs; its guard is released on every exit
    /// path. A write rejected with `ValueTooLarge` only skips caching.
    ///
    /// # Errors
    ///
    /// Errors from `compute` are returned unchanged. Cache failures other than
    /// a miss or an oversized value are converted into `E`.
    pub async fn get_or_compute<T, A, F, Fut, E>(&self, function: &FunctionId, args: &A, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        A: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        let key = self.make_key(function, args)?;

        let cached = {
            let _guard = self.acquire().await;
            self.cache.get(&key).await
        };

        match cached {
            Ok(bytes) => match self.codec.deserialize::<T>(&bytes) {
                Ok(value) => {
                    self.record(&self.hits);
                    debug!(function = %function, key = %key, "[Memoize] Hit");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(function = %function, key = %key, codec = self.codec.name(), error = %e, "[Memoize] Cached value undecodable, recomputing");
                }
            },
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        self.record(&self.misses);
        debug!(function = %function, key = %key, "[Memoize] Miss, computing");
        let value = compute().await?;
        let bytes = self.codec.serialize(&value).map_err(CacheError::from)?;

        let stored = {
            let _guard = self.acquire().await;
            self.cache.set(&key, &bytes).await
        };

        match stored {
            Ok(()) => {}
            Err(e) if e.is_value_too_large() => {
                debug!(function = %function, key = %key, error = %e, "[Memoize] Result too large to cache");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(value)
    }

    /// Counters and cache size, or `None` when info tracking is disabled
    ///
    /// # Errors
    ///
    /// Returns an error if the cache size cannot be read.
    pub async fn cache_info(&self) -> Result<Option<CacheInfo>> {
        if !self.info {
            return Ok(None);
        }
        Ok(Some(CacheInfo {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            maxsize: None,
            currsize: self.cache.len().await?,
        }))
    }

    /// Clear the cache and zero the counters
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be cleared.
    pub async fn cache_clear(&self) -> Result<()> {
        self.cache.clear().await?;
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn acquire(&self) -> Option<MutexGuard<'_, ()>> {
        match &self.lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        }
    }

    fn record(&self, counter: &AtomicU64) {
        if self.info {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}
