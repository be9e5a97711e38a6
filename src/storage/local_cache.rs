//! Timestamped on-device cache with TTL expiry and capacity compaction.
//!
//! The whole map is persisted as one JSON document under a logical key in
//! the key-value store (`articleCache`, `summaryCache`). Reads are served
//! from memory; every mutation rewrites the document.
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::schema::Database;
use super::types::StorageError;
use crate::util::Clock;

/// Logical storage key for extracted article bodies.
pub const ARTICLE_CACHE_KEY: &str = "articleCache";
/// Logical storage key for AI summaries.
pub const SUMMARY_CACHE_KEY: &str = "summaryCache";

/// Default number of entries kept after compaction.
pub const DEFAULT_CAPACITY: usize = 50;
/// Default entry lifetime.
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// A cached value and the unix-millisecond time it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: i64,
}

/// Capacity and lifetime for a [`LocalCache`].
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }
}

pub struct LocalCache<V> {
    db: Database,
    key: &'static str,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> LocalCache<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Load the cache stored under `key`.
    ///
    /// Missing, unreadable or malformed data yields an empty cache; the
    /// problem is logged and never propagated.
    pub async fn load(
        db: Database,
        key: &'static str,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = match db.store_get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<HashMap<String, CacheEntry<V>>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(key, error = %e, "Malformed cache data, starting empty");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to read cache, starting empty");
                HashMap::new()
            }
        };

        tracing::debug!(key, entries = entries.len(), "Loaded local cache");
        Self {
            db,
            key,
            policy,
            clock,
            entries,
        }
    }

    /// Return the value for `url` if it was written less than one TTL ago.
    ///
    /// An expired entry is evicted on the spot and reported as a miss.
    pub async fn get(&mut self, url: &str) -> Option<V> {
        let entry = self.entries.get(url)?;
        let age_ms = self.clock.now_ms() - entry.timestamp;
        if age_ms < self.policy.ttl.num_milliseconds() {
            return Some(entry.value.clone());
        }

        tracing::debug!(key = self.key, url, age_ms, "Cache entry expired, evicting");
        self.entries.remove(url);
        self.persist().await;
        None
    }

    /// Store `value` for `url` stamped with the current time, then compact.
    pub async fn put(&mut self, url: &str, value: V) {
        let timestamp = self.clock.now_ms();
        self.entries
            .insert(url.to_string(), CacheEntry { value, timestamp });
        self.compact();

        if let Err(e) = self.write().await {
            // Quota pressure: drop everything but the new entry and try once more
            tracing::warn!(key = self.key, error = %e, "Cache write failed, clearing cache and retrying");
            self.entries.retain(|k, _| k == url);
            if let Err(e) = self.write().await {
                tracing::error!(key = self.key, url, error = %e, "Cache write failed after clearing, dropping entry");
                self.entries.clear();
                if let Err(e) = self.db.store_remove(self.key).await {
                    tracing::error!(key = self.key, error = %e, "Failed to remove cache document");
                }
            }
        }
    }

    /// Drop every entry, in memory and on disk.
    pub async fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.db.store_remove(self.key).await {
            tracing::error!(key = self.key, error = %e, "Failed to clear cache");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if an entry exists for `url`, expired or not.
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Keep only the `capacity` newest entries by write time.
    fn compact(&mut self) {
        if self.entries.len() <= self.policy.capacity {
            return;
        }

        let mut by_age: Vec<(String, i64)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.timestamp))
            .collect();
        by_age.sort_by(|a, b| b.1.cmp(&a.1));

        let evicted = by_age.len() - self.policy.capacity;
        for (url, _) in by_age.into_iter().skip(self.policy.capacity) {
            self.entries.remove(&url);
        }
        tracing::debug!(key = self.key, evicted, "Compacted cache");
    }

    async fn write(&self) -> Result<(), StorageError> {
        let json = serde_json::to_string(&self.entries).map_err(|source| StorageError::Serialize {
            key: self.key.to_string(),
            source,
        })?;
        self.db.store_put(self.key, &json).await
    }

    /// Best-effort write used after evictions, where losing the write only
    /// means the evicted entry comes back on next load and expires again.
    async fn persist(&self) {
        if let Err(e) = self.write().await {
            tracing::warn!(key = self.key, error = %e, "Failed to persist cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ManualClock;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    async fn cache(db: &Database, clock: &ManualClock) -> LocalCache<String> {
        LocalCache::load(
            db.clone(),
            ARTICLE_CACHE_KEY,
            CachePolicy::default(),
            Arc::new(clock.clone()),
        )
        .await
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let db = Database::open(":memory:").await.unwrap();
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        cache.put("https://a.example/1", "body".to_string()).await;
        assert_eq!(cache.get("https://a.example/1").await.as_deref(), Some("body"));
        assert_eq!(cache.get("https://a.example/2").await, None);
    }

    #[tokio::test]
    async fn test_entry_just_under_ttl_is_hit() {
        let db = Database::open(":memory:").await.unwrap();
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        cache.put("u", "v".to_string()).await;
        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(cache.get("u").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let db = Database::open(":memory:").await.unwrap();
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        cache.put("u", "v".to_string()).await;
        clock.advance(Duration::hours(24) + Duration::seconds(1));

        assert_eq!(cache.get("u").await, None);
        assert!(!cache.contains("u"));

        // Eviction is persisted
        let reloaded = self::cache(&db, &clock).await;
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn test_compaction_keeps_newest() {
        let db = Database::open(":memory:").await.unwrap();
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        for i in 0..51 {
            cache.put(&format!("u{i}"), format!("v{i}")).await;
            clock.advance(Duration::seconds(1));
        }

        assert_eq!(cache.len(), 50);
        assert!(!cache.contains("u0"));
        assert!(cache.contains("u1"));
        assert!(cache.contains("u50"));
    }

    #[tokio::test]
    async fn test_malformed_document_loads_empty() {
        let db = Database::open(":memory:").await.unwrap();
        db.store_put(ARTICLE_CACHE_KEY, "{not json").await.unwrap();

        let clock = clock();
        let cache = cache(&db, &clock).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_quota_failure_clears_and_retries() {
        let db = Database::open(":memory:").await.unwrap().with_storage_quota(200);
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        cache.put("a", "x".repeat(60)).await;
        cache.put("b", "y".repeat(60)).await;
        // Both together exceed the quota: the cache is cleared down to the new entry
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("b"));

        let reloaded = self::cache(&db, &clock).await;
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("b"));
    }

    #[tokio::test]
    async fn test_write_dropped_when_retry_fails() {
        let db = Database::open(":memory:").await.unwrap().with_storage_quota(20);
        let clock = clock();
        let mut cache = cache(&db, &clock).await;

        cache.put("a", "z".repeat(100)).await;
        assert!(cache.is_empty());
        assert_eq!(db.store_get(ARTICLE_CACHE_KEY).await.unwrap(), None);
    }
}
