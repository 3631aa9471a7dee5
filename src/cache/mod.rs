//! Question-Keyed Result Cache
//!
//! Successful pipeline answers are memoized under a deterministic fingerprint
//! of the question text so an identical question is served without a second
//! generation or execution call.
//!
//! # Key Derivation
//! The cache key is `q:` plus the hex SHA-256 digest of the question after
//! trimming and lowercasing. Identical questions always collide onto the same
//! key; distinct questions only collide by hash collision.
//!
//! # Degradation Contract
//! A backing store failure must never abort the pipeline. The first failure
//! flips the cache into a disabled state (logged once); every later call
//! proceeds as a miss. Expiry is delegated to the store's native mechanism.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::{Result, SqlsightError};

/// Default cached result lifetime in seconds.
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Derive the cache key for a question.
///
/// Pure function of the normalized question text: trim, lowercase, digest.
#[must_use]
pub fn fingerprint(question: &str) -> String {
    let normalized = question.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    format!("q:{}", hex::encode(digest))
}

/// A memoized pipeline answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResult {
    /// Generated SQL that produced this result
    pub sql: String,

    /// Ordered column names
    pub columns: Vec<String>,

    /// Row records
    pub rows: Vec<Vec<serde_json::Value>>,

    /// Number of rows
    pub row_count: usize,

    /// When the result was cached
    pub cached_at: DateTime<Utc>,
}

/// Backing store contract for the result cache.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn CacheStore>`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value; `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value with a time-to-live in seconds.
    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()>;
}

/// In-process store backed by a `HashMap`.
///
/// Used for tests and cacheless deployments. Expiry is checked on read.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| SqlsightError::cache_unavailable("memory store lock poisoned"))?;

        Ok(entries.get(key).and_then(|(value, deadline)| {
            (Instant::now() < *deadline).then(|| value.clone())
        }))
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(ttl_secs);
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SqlsightError::cache_unavailable("memory store lock poisoned"))?;

        entries.insert(key.to_string(), (value, deadline));
        Ok(())
    }
}

/// Redis-backed store using the server's native SETEX expiry.
pub struct RedisStore {
    connection: redis::aio::MultiplexedConnection,
}

impl RedisStore {
    /// Connect to a Redis instance.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let client = redis::Client::open(format!("redis://{host}:{port}")).map_err(|e| {
            SqlsightError::cache_unavailable(format!("invalid redis address: {e}"))
        })?;

        let connection = client.get_multiplexed_async_connection().await.map_err(|e| {
            SqlsightError::cache_unavailable(format!("redis connection failed: {e}"))
        })?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        use redis::AsyncCommands;

        let mut connection = self.connection.clone();
        connection
            .get(key)
            .await
            .map_err(|e| SqlsightError::cache_unavailable(format!("redis get failed: {e}")))
    }

    async fn put(&self, key: &str, value: String, ttl_secs: u64) -> Result<()> {
        use redis::AsyncCommands;

        let mut connection = self.connection.clone();
        connection
            .set_ex(key, value, ttl_secs)
            .await
            .map_err(|e| SqlsightError::cache_unavailable(format!("redis setex failed: {e}")))
    }
}

/// Question-keyed cache front-end with fail-open degradation.
pub struct ResultCache {
    store: Option<Arc<dyn CacheStore>>,
    disabled: AtomicBool,
    ttl_secs: u64,
}

impl ResultCache {
    /// Cache backed by an arbitrary store.
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, ttl_secs: u64) -> Self {
        Self { store: Some(store), disabled: AtomicBool::new(false), ttl_secs }
    }

    /// Cache backed by the in-process memory store.
    #[must_use]
    pub fn memory(ttl_secs: u64) -> Self {
        Self::new(Arc::new(MemoryStore::new()), ttl_secs)
    }

    /// Cache that never stores anything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { store: None, disabled: AtomicBool::new(true), ttl_secs: 0 }
    }

    /// Connect a Redis-backed cache, degrading to disabled when unreachable.
    pub async fn redis(host: &str, port: u16, ttl_secs: u64) -> Self {
        match RedisStore::connect(host, port).await {
            Ok(store) => Self::new(Arc::new(store), ttl_secs),
            Err(e) => {
                tracing::warn!("result cache disabled: {e}");
                Self::disabled()
            }
        }
    }

    /// Whether the cache is currently operational.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.store.is_some() && !self.disabled.load(Ordering::Relaxed)
    }

    /// Look up a memoized answer for a question.
    pub async fn get(&self, question: &str) -> Option<CachedResult> {
        let store = self.active_store()?;

        match store.get(&fingerprint(question)).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(result) => Some(result),
                Err(e) => {
                    // Structurally unreadable entries count as misses
                    tracing::debug!("discarding undecodable cache entry: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                self.disable(&e);
                None
            }
        }
    }

    /// Memoize an answer under the question's fingerprint (best-effort).
    pub async fn put(&self, question: &str, result: &CachedResult) {
        let Some(store) = self.active_store() else { return };

        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("failed to serialize cache entry: {e}");
                return;
            }
        };

        if let Err(e) = store.put(&fingerprint(question), payload, self.ttl_secs).await {
            self.disable(&e);
        }
    }

    fn active_store(&self) -> Option<&Arc<dyn CacheStore>> {
        if self.disabled.load(Ordering::Relaxed) {
            return None;
        }
        self.store.as_ref()
    }

    fn disable(&self, err: &SqlsightError) {
        // Log the degradation once; later calls silently miss
        if !self.disabled.swap(true, Ordering::Relaxed) {
            tracing::warn!("result cache disabled: {}", err.message());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> CachedResult {
        CachedResult {
            sql: "SELECT COUNT(*) FROM customers;".to_string(),
            columns: vec!["count".to_string()],
            rows: vec![vec![serde_json::json!(42)]],
            row_count: 1,
            cached_at: Utc::now(),
        }
    }

    #[test]
    fn test_fingerprint_normalizes_case_and_whitespace() {
        assert_eq!(fingerprint("Count Customers"), fingerprint("  count customers  "));
        assert_eq!(fingerprint("count customers"), fingerprint("COUNT CUSTOMERS"));
    }

    #[test]
    fn test_fingerprint_distinct_questions_differ() {
        assert_ne!(fingerprint("count customers"), fingerprint("count orders"));
    }

    #[test]
    fn test_fingerprint_is_prefixed_hex() {
        let key = fingerprint("count customers");
        assert!(key.starts_with("q:"));
        assert_eq!(key.len(), 2 + 64); // prefix + hex SHA-256
    }

    #[tokio::test]
    async fn test_cache_round_trip() {
        let cache = ResultCache::memory(60);
        let result = sample_result();

        cache.put("count customers", &result).await;
        let hit = cache.get("count customers").await.unwrap();
        assert_eq!(hit, result);
    }

    #[tokio::test]
    async fn test_cache_miss_for_unknown_question() {
        let cache = ResultCache::memory(60);
        assert!(cache.get("never asked").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_ignores_case_and_whitespace() {
        let cache = ResultCache::memory(60);
        cache.put("Count Customers", &sample_result()).await;
        assert!(cache.get("  count customers ").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss() {
        let cache = ResultCache::memory(0);
        cache.put("count customers", &sample_result()).await;
        assert!(cache.get("count customers").await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_hits() {
        let cache = ResultCache::disabled();
        cache.put("count customers", &sample_result()).await;
        assert!(cache.get("count customers").await.is_none());
        assert!(!cache.is_enabled());
    }

    struct FailingStore;

    #[async_trait]
    impl CacheStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(SqlsightError::cache_unavailable("store offline"))
        }

        async fn put(&self, _key: &str, _value: String, _ttl_secs: u64) -> Result<()> {
            Err(SqlsightError::cache_unavailable("store offline"))
        }
    }

    #[tokio::test]
    async fn test_store_failure_degrades_to_disabled() {
        let cache = ResultCache::new(Arc::new(FailingStore), 60);
        assert!(cache.is_enabled());

        // First failure flips the cache off; the call itself is a miss
        assert!(cache.get("count customers").await.is_none());
        assert!(!cache.is_enabled());

        // Later calls proceed as misses without touching the store
        cache.put("count customers", &sample_result()).await;
        assert!(cache.get("count customers").await.is_none());
    }
}
