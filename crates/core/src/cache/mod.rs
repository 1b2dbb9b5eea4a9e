//! Expiring cache on top of the key-value store.
//!
//! Entries are stored as `{"data", "timestamp", "expiresAt"}` JSON under
//! `collection + "_" + key`. Expired entries are removed lazily on read, or
//! eagerly through pattern invalidation and [`CacheManager::purge_expired`].
//!
//! Caching is an optimization: the public methods never fail. The `try_*`
//! variants expose the underlying store errors for callers that want them.

pub mod keys;
pub mod ttl;

use std::sync::Arc;

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use crate::error::LogFailure;
use crate::store::KeyValueStore;
use crate::Error;

pub use keys::query_key;
pub use ttl::{DEFAULT_TTL, TtlPolicy};

/// Key fragments that identify cache entries removed by [`CacheManager::clear_all`].
pub const CACHE_FAMILIES: &[&str] = &["donation", "rides", "community_stats", "user_profile"];

/// A cached value with its write time and expiry, both epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub timestamp: i64,
    pub expires_at: i64,
}

impl<T> CacheEntry<T> {
    /// Whether the entry is still valid at `now_ms`.
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Store key for an entry in `collection`.
pub fn entry_key(collection: &str, key: &str) -> String {
    format!("{collection}_{key}")
}

/// Cache with per-collection expiry and substring invalidation.
pub struct CacheManager<S: KeyValueStore> {
    store: Arc<S>,
    ttl: TtlPolicy,
}

impl<S: KeyValueStore> Clone for CacheManager<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), ttl: self.ttl.clone() }
    }
}

impl<S: KeyValueStore> CacheManager<S> {
    pub fn new(store: Arc<S>, ttl: TtlPolicy) -> Self {
        Self { store, ttl }
    }

    /// Read a valid entry, or `None` on miss, expiry or any store/decode failure.
    pub async fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Option<T> {
        self.try_get(collection, key)
            .await
            .log_failure("cache read failed")
            .flatten()
    }

    /// Read a valid entry, surfacing store and decode errors.
    ///
    /// Expired and undecodable entries are deleted as a side effect.
    pub async fn try_get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>, Error> {
        let store_key = entry_key(collection, key);
        let Some(raw) = self.store.get(&store_key).await? else {
            return Ok(None);
        };

        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                self.store.remove(&store_key).await?;
                return Err(e.into());
            }
        };

        if !entry.is_valid_at(now_ms()) {
            tracing::debug!(key = %store_key, "cache entry expired");
            self.store.remove(&store_key).await?;
            return Ok(None);
        }

        Ok(Some(entry.data))
    }

    /// Write `data` with the collection's expiry. Failures are logged.
    pub async fn set<T: Serialize>(&self, collection: &str, key: &str, data: &T) {
        self.try_set(collection, key, data).await.log_failure("cache write failed");
    }

    /// Write `data` with the collection's expiry, returning the stored entry metadata.
    pub async fn try_set<T: Serialize>(&self, collection: &str, key: &str, data: &T) -> Result<CacheEntry<()>, Error> {
        let timestamp = now_ms();
        let ttl_ms = i64::try_from(self.ttl.ttl_for(collection).as_millis()).unwrap_or(i64::MAX);
        let expires_at = timestamp.saturating_add(ttl_ms.max(1));

        let entry = CacheEntry { data, timestamp, expires_at };
        let json = serde_json::to_string(&entry)?;
        self.store.set(&entry_key(collection, key), &json).await?;

        Ok(CacheEntry { data: (), timestamp, expires_at })
    }

    /// Remove every store key containing `pattern`. Returns the number removed; failures count as 0.
    pub async fn invalidate_pattern(&self, pattern: &str) -> u64 {
        self.try_invalidate_pattern(pattern)
            .await
            .log_failure("cache invalidation failed")
            .unwrap_or(0)
    }

    pub async fn try_invalidate_pattern(&self, pattern: &str) -> Result<u64, Error> {
        self.remove_matching(|key| key.contains(pattern)).await
    }

    /// Remove every entry belonging to a [`CACHE_FAMILIES`] collection.
    pub async fn clear_all(&self) -> u64 {
        self.remove_matching(|key| CACHE_FAMILIES.iter().any(|family| key.contains(family)))
            .await
            .log_failure("cache clear failed")
            .unwrap_or(0)
    }

    /// Delete all cache entries whose expiry has passed.
    ///
    /// Keys whose value is not a cache entry (e.g. the offline queue) are left alone.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = now_ms();
        let mut expired = Vec::new();

        for key in self.store.keys().await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            if let Ok(entry) = serde_json::from_str::<CacheEntry<IgnoredAny>>(&raw)
                && !entry.is_valid_at(now)
            {
                expired.push(key);
            }
        }

        let removed = self.store.remove_many(&expired).await?;
        if removed > 0 {
            tracing::debug!(removed, "purged expired cache entries");
        }
        Ok(removed)
    }

    async fn remove_matching(&self, matches: impl Fn(&str) -> bool) -> Result<u64, Error> {
        let keys: Vec<String> = self
            .store
            .keys()
            .await?
            .into_iter()
            .filter(|key| matches(key))
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self.store.remove_many(&keys).await?;
        tracing::debug!(removed, "invalidated cache keys");
        Ok(removed)
    }
}
