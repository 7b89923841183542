//! Redis Cache - Remote Backing Store Level
//!
//! Redis-based distributed level. Keys are namespaced with an optional prefix,
//! values are stored in a wire-safe string form and every write carries the
//! configured expiry.

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{CacheError, Result};
use crate::traits::{CacheBackend, KeyStream, StatsSnapshot};

/// Keys fetched per `SCAN` round trip
const SCAN_PAGE_SIZE: usize = 100;

/// Keys deleted per `DEL` round trip when clearing a prefix
const DELETE_BATCH_SIZE: usize = 500;

/// Redis' own limit for a string value
const REDIS_MAX_VALUE_SIZE: usize = 512 * 1024 * 1024;

/// Configuration for `RedisCache`
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    /// Redis connection string (e.g. `redis://localhost:6379/0`)
    pub url: String,
    /// Expiry applied to every write; `None` stores keys without expiry
    pub ttl: Option<Duration>,
    /// Namespace prepended to every key
    pub prefix: String,
    /// Payloads above this size are rejected with `ValueTooLarge`
    pub max_value_size: usize,
}

impl Default for RedisCacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            ttl: Some(Duration::from_secs(600)),
            prefix: String::new(),
            max_value_size: REDIS_MAX_VALUE_SIZE,
        }
    }
}

impl RedisCacheConfig {
    /// Default configuration pointed at `url`
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Read `REDIS_URL`, `CACHE_TTL_SECS` (0 disables expiry) and `CACHE_PREFIX`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `CACHE_TTL_SECS` is not an integer.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.url = url;
        }
        if let Ok(raw) = std::env::var("CACHE_TTL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CacheError::invalid_configuration(format!("CACHE_TTL_SECS is not an integer: {raw}"))
            })?;
            config.ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Ok(prefix) = std::env::var("CACHE_PREFIX") {
            config.prefix = prefix;
        }

        Ok(config)
    }
}

/// Redis distributed cache with `ConnectionManager` for automatic reconnection
///
/// Every call is an independent round trip, so one instance can be shared
/// freely between tasks and chains.
pub struct RedisCache {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
    expiry: WriteExpiry,
    prefix: String,
    max_value_size: usize,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("expiry", &self.expiry)
            .field("prefix", &self.prefix)
            .field("max_value_size", &self.max_value_size)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Create new Redis cache configured from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the connection fails.
    pub async fn new() -> Result<Self> {
        Self::with_config(RedisCacheConfig::from_env()?).await
    }

    /// Create new Redis cache with custom URL and default settings
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the connection fails.
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        Self::with_config(RedisCacheConfig::with_url(redis_url)).await
    }

    /// Create new Redis cache from an explicit configuration
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a malformed URL or a zero TTL,
    /// `Backend` if the connection or the initial `PING` fails.
    pub async fn with_config(config: RedisCacheConfig) -> Result<Self> {
        info!(redis_url = %config.url, prefix = %config.prefix, "Initializing Redis Cache with ConnectionManager");

        let expiry = WriteExpiry::from_ttl(config.ttl)?;

        let client = Client::open(config.url.as_str()).map_err(|e| {
            CacheError::invalid_configuration(format!("invalid Redis URL '{}': {e}", config.url))
        })?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %config.url, "Redis Cache connected successfully (ConnectionManager enabled)");

        Ok(Self {
            conn_manager,
            expiry,
            prefix: config.prefix,
            max_value_size: config.max_value_size,
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// `MATCH` pattern covering every key under this cache's prefix
    fn namespace_pattern(&self) -> String {
        format!("{}*", glob_escape(&self.prefix))
    }

    /// Scan keys matching a pattern (glob-style: *, ?, [])
    ///
    /// Uses Redis SCAN command (non-blocking, cursor-based iteration).
    /// The pattern is matched against raw Redis keys, prefix included.
    ///
    /// # Examples
    /// ```no_run
    /// # use cache_chain::backends::RedisCache;
    /// # async fn example() -> cache_chain::Result<()> {
    /// # let cache = RedisCache::new().await?;
    /// let keys = cache.scan_keys("user:*").await?;
    /// # Ok(())
    /// # }
    /// ```
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, page) = scan_page(&mut conn, cursor, pattern).await?;
            keys.extend(page);
            cursor = next;
            // Cursor 0 means iteration is complete
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    /// Remove multiple raw keys at once (bulk delete)
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn_manager.clone();
        let count: usize = conn.del(keys).await.context("Redis DEL failed")?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    /// Server-wide `keyspace_hits` / `keyspace_misses`
    async fn keyspace_counters(&self) -> Result<(u64, u64)> {
        let mut conn = self.conn_manager.clone();
        let info: String = redis::cmd("INFO")
            .arg("stats")
            .query_async(&mut conn)
            .await
            .context("Redis INFO failed")?;
        Ok((
            info_field(&info, "keyspace_hits"),
            info_field(&info, "keyspace_misses"),
        ))
    }
}

/// Expiry command attached to every write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteExpiry {
    /// Plain `SET`
    Never,
    /// `SETEX`, for whole-second TTLs
    Seconds(u64),
    /// `PSETEX`, for TTLs with a sub-second part
    Millis(u64),
}

impl WriteExpiry {
    /// Only `None` disables expiry; a zero TTL is rejected
    fn from_ttl(ttl: Option<Duration>) -> Result<Self> {
        match ttl {
            None => Ok(Self::Never),
            Some(ttl) if ttl.is_zero() => Err(CacheError::invalid_configuration(
                "Redis TTL must be positive, use `None` to disable expiry",
            )),
            Some(ttl) if ttl.subsec_nanos() == 0 => Ok(Self::Seconds(ttl.as_secs())),
            // sub-millisecond remainders round up so the key still expires
            Some(ttl) => Ok(Self::Millis(
                u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1),
            )),
        }
    }
}

async fn scan_page(conn: &mut ConnectionManager, cursor: u64, pattern: &str) -> Result<(u64, Vec<String>)> {
    let page: (u64, Vec<String>) = redis::cmd("SCAN")
        .arg(cursor)
        .arg("MATCH")
        .arg(pattern)
        .arg("COUNT")
        .arg(SCAN_PAGE_SIZE)
        .query_async(conn)
        .await
        .context("Redis SCAN failed")?;
    Ok(page)
}

/// Escape glob metacharacters so a prefix matches literally
fn glob_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn strip_namespace(prefix: &str, mut key: String) -> String {
    if !prefix.is_empty() && key.starts_with(prefix) {
        key.drain(..prefix.len());
    }
    key
}

/// Read an integer field from `INFO` output (`name:value` lines)
fn info_field(info: &str, name: &str) -> u64 {
    info.lines()
        .filter_map(|line| line.trim().split_once(':'))
        .find(|(field, _)| *field == name)
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

/// Wire-safe string form of stored values
///
/// UTF-8 payloads are stored verbatim so they stay readable with `redis-cli`;
/// anything else, and text that already starts with the tag, is stored as
/// `b64:` followed by standard base64.
mod wire {
    use anyhow::Context;
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

    const BASE64_TAG: &str = "b64:";

    pub fn encode(bytes: &[u8]) -> String {
        match std::str::from_utf8(bytes) {
            Ok(text) if !text.starts_with(BASE64_TAG) => text.to_string(),
            _ => format!("{BASE64_TAG}{}", BASE64.encode(bytes)),
        }
    }

    pub fn decode(stored: String) -> anyhow::Result<Vec<u8>> {
        match stored.strip_prefix(BASE64_TAG) {
            Some(encoded) => BASE64
                .decode(encoded)
                .context("stored value has an invalid base64 payload"),
            None => Ok(stored.into_bytes()),
        }
    }

}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.conn_manager.clone();
        let stored: Option<String> = conn
            .get(self.full_key(key))
            .await
            .with_context(|| format!("Redis GET failed for key '{key}'"))?;

        match stored {
            Some(stored) => Ok(wire::decode(stored)?),
            None => Err(CacheError::not_found(key)),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(CacheError::ValueTooLarge {
                key: key.to_string(),
                size: value.len(),
                limit: self.max_value_size,
            });
        }

        let mut conn = self.conn_manager.clone();
        let full_key = self.full_key(key);
        let stored = wire::encode(value);

        match self.expiry {
            WriteExpiry::Seconds(secs) => {
                let _: () = conn
                    .set_ex(&full_key, stored, secs)
                    .await
                    .with_context(|| format!("Redis SETEX failed for key '{key}'"))?;
                debug!(key = %key, ttl_secs = secs, "[Redis] Cached key with TTL");
            }
            WriteExpiry::Millis(millis) => {
                let _: () = conn
                    .pset_ex(&full_key, stored, millis)
                    .await
                    .with_context(|| format!("Redis PSETEX failed for key '{key}'"))?;
                debug!(key = %key, ttl_ms = millis, "[Redis] Cached key with TTL");
            }
            WriteExpiry::Never => {
                let _: () = conn
                    .set(&full_key, stored)
                    .await
                    .with_context(|| format!("Redis SET failed for key '{key}'"))?;
                debug!(key = %key, "[Redis] Cached key");
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let deleted: usize = conn
            .del(self.full_key(key))
            .await
            .with_context(|| format!("Redis DEL failed for key '{key}'"))?;

        if deleted == 0 {
            return Err(CacheError::not_found(key));
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        if !self.prefix.is_empty() {
            return Ok(self.scan_keys(&self.namespace_pattern()).await?.len());
        }

        let mut conn = self.conn_manager.clone();
        let size: usize = redis::cmd("DBSIZE")
            .query_async(&mut conn)
            .await
            .context("Redis DBSIZE failed")?;
        Ok(size)
    }

    fn keys(&self) -> KeyStream<'_> {
        let conn = self.conn_manager.clone();
        let pattern = self.namespace_pattern();
        let prefix = self.prefix.clone();

        let pages = stream::try_unfold((conn, Some(0_u64)), move |(mut conn, cursor)| {
            let pattern = pattern.clone();
            async move {
                let Some(cursor) = cursor else {
                    return Ok(None);
                };
                let page: Result<(u64, Vec<String>)> = scan_page(&mut conn, cursor, &pattern).await;
                page.map(|(next, keys)| Some((keys, (conn, (next != 0).then_some(next)))))
            }
        });

        pages
            .map_ok(move |keys| {
                let prefix = prefix.clone();
                stream::iter(
                    keys.into_iter()
                        .map(move |key| Ok::<_, CacheError>(strip_namespace(&prefix, key))),
                )
            })
            .try_flatten()
            .boxed()
    }

    async fn clear(&self) -> Result<()> {
        if self.prefix.is_empty() {
            let mut conn = self.conn_manager.clone();
            let _: () = redis::cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .context("Redis FLUSHDB failed")?;
            info!("[Redis] Flushed database");
            return Ok(());
        }

        let keys = self.scan_keys(&self.namespace_pattern()).await?;
        let mut removed = 0;
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            removed += self.remove_bulk(batch).await?;
        }
        info!(prefix = %self.prefix, count = removed, "[Redis] Cleared namespace");
        Ok(())
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        let (hits, misses) = self.keyspace_counters().await?;
        let keys = self.len().await?;

        let mut snapshot = StatsSnapshot::new();
        snapshot.insert("keys".to_string(), json!(keys));
        snapshot.insert("hits".to_string(), json!(hits));
        snapshot.insert("misses".to_string(), json!(misses));
        Ok(snapshot)
    }

    #[allow(clippy::cast_precision_loss)]
    async fn hits(&self) -> Result<Option<f64>> {
        let (hits, misses) = self.keyspace_counters().await?;
        let total = hits + misses;
        Ok((total > 0).then(|| hits as f64 / total as f64))
    }

    async fn reset(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = redis::cmd("CONFIG")
            .arg("RESETSTAT")
            .query_async(&mut conn)
            .await
            .context("Redis CONFIG RESETSTAT failed")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_escape() {
        assert_eq!(glob_escape("app:"), "app:");
        assert_eq!(glob_escape("a*b?[c]"), "a\\*b\\?\\[c\\]");
    }

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("app:", "app:user:1".to_string()), "user:1");
        assert_eq!(strip_namespace("", "user:1".to_string()), "user:1");
        assert_eq!(strip_namespace("app:", "other:1".to_string()), "other:1");
    }

    #[test]
    fn test_info_field() {
        let info = "# Stats\r\nkeyspace_hits:42\r\nkeyspace_misses:8\r\n";
        assert_eq!(info_field(info, "keyspace_hits"), 42);
        assert_eq!(info_field(info, "keyspace_misses"), 8);
        assert_eq!(info_field(info, "evicted_keys"), 0);
    }

    #[test]
    fn test_write_expiry_from_ttl() {
        assert_eq!(WriteExpiry::from_ttl(None).unwrap(), WriteExpiry::Never);
        assert_eq!(
            WriteExpiry::from_ttl(Some(Duration::from_secs(600))).unwrap(),
            WriteExpiry::Seconds(600)
        );
        assert_eq!(
            WriteExpiry::from_ttl(Some(Duration::from_millis(500))).unwrap(),
            WriteExpiry::Millis(500)
        );
        assert_eq!(
            WriteExpiry::from_ttl(Some(Duration::from_millis(1500))).unwrap(),
            WriteExpiry::Millis(1500)
        );
        assert_eq!(
            WriteExpiry::from_ttl(Some(Duration::from_micros(10))).unwrap(),
            WriteExpiry::Millis(1)
        );
    }

    #[test]
    fn test_zero_ttl_is_rejected() {
        let error = WriteExpiry::from_ttl(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(error, CacheError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_config_defaults() {
        let config = RedisCacheConfig::with_url("redis://cache:6379");
        assert_eq!(config.url, "redis://cache:6379");
        assert_eq!(config.ttl, Some(Duration::from_secs(600)));
        assert!(config.prefix.is_empty());
    }
}
