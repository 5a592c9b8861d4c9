//! Expiring cache with LRU eviction.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::ttl::TtlTracker;

struct CacheInner<V> {
    lru: LruCache<String, V>,
    ttl: TtlTracker,
}

/// String-keyed cache with LRU eviction and optional insertion TTL.
///
/// Cloning is cheap; clones share the same storage.
pub struct ExpiringCache<V> {
    inner: Arc<RwLock<CacheInner<V>>>,
    config: CacheConfig,
}

impl<V: Clone + Send + Sync> ExpiringCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);

        let inner = CacheInner {
            lru: LruCache::new(cap),
            ttl: TtlTracker::new(config.ttl),
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.lru.is_empty()
    }

    /// Get a value, promoting it in LRU order.
    ///
    /// Expired values are removed and reported as missing. Reading does not
    /// extend the TTL.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().await;

        if inner.ttl.is_expired(key) {
            if inner.lru.pop(key).is_some() {
                debug!(key = %key, "Cache entry expired");
            }
            inner.ttl.remove(key);
            return None;
        }

        let value = inner.lru.get(key).cloned();
        if value.is_some() {
            trace!(key = %key, "Cache hit");
        }
        value
    }

    /// Insert or replace a value. Evicts the least recently used entry when
    /// the cache is full.
    pub async fn insert(&self, key: &str, value: V) {
        let mut inner = self.inner.write().await;

        if !inner.lru.contains(key) && inner.lru.len() >= self.config.max_entries {
            if let Some((evicted, _)) = inner.lru.pop_lru() {
                debug!(key = %evicted, "Evicting LRU cache entry to make room");
                inner.ttl.remove(&evicted);
            }
        }

        inner.lru.put(key.to_string(), value);
        inner.ttl.stamp(key);

        trace!(key = %key, cache_size = inner.lru.len(), "Cache entry inserted");
    }

    /// Check whether a live value exists, without touching LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        let inner = self.inner.read().await;
        inner.lru.contains(key) && !inner.ttl.is_expired(key)
    }

    /// Remove a value.
    pub async fn invalidate(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.ttl.remove(key);
        let removed = inner.lru.pop(key);
        if removed.is_some() {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    /// Drop every expired entry and return how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.write().await;
        let expired = inner.ttl.drain_expired();
        let mut count = 0;
        for key in expired {
            if inner.lru.pop(&key).is_some() {
                count += 1;
            }
        }

        if count > 0 {
            debug!(count = count, "Cleaned up expired cache entries");
        }
        count
    }
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}
