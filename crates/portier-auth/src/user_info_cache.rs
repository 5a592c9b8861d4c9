//! Per-session user info cache.

use std::time::Duration;

use portier_cache::{CacheConfig, ExpiringCache};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::identity::UserInfo;

/// Remembers the user info fetched for a session cookie so protected
/// requests do not hit the userinfo endpoint every time.
///
/// Bounded by entry count (LRU) and age (TTL from insertion). Keyed by the
/// raw session cookie value. A cache built with
/// [`with_purge`](Self::with_purge) drops expired entries in the background
/// until [`shutdown`](Self::shutdown) or drop.
pub struct UserInfoCache {
    inner: ExpiringCache<UserInfo>,
    cancel: CancellationToken,
}

impl UserInfoCache {
    /// Create a cache without a background purge.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: ExpiringCache::new(config),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a cache and purge expired entries once per TTL period.
    ///
    /// Nothing is spawned when the cache has no TTL or there is no tokio
    /// runtime; expired entries then only leave on read.
    pub fn with_purge(config: CacheConfig) -> Self {
        let cache = Self::new(config);
        let Some(period) = cache.inner.config().ttl.filter(|ttl| !ttl.is_zero()) else {
            cache.cancel.cancel();
            return cache;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => spawn_purge(&handle, cache.inner.clone(), period, cache.cancel.clone()),
            Err(_) => {
                warn!("No tokio runtime; user info purge disabled");
                cache.cancel.cancel();
            }
        }
        cache
    }

    pub async fn get(&self, cookie_value: &str) -> Option<UserInfo> {
        self.inner.get(cookie_value).await
    }

    pub async fn insert(&self, cookie_value: &str, info: UserInfo) {
        self.inner.insert(cookie_value, info).await;
    }

    pub async fn invalidate(&self, cookie_value: &str) {
        self.inner.invalidate(cookie_value).await;
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.is_empty().await
    }

    pub fn is_purging(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop the background purge.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for UserInfoCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_purge(
    handle: &tokio::runtime::Handle,
    cache: ExpiringCache<UserInfo>,
    period: Duration,
    cancel: CancellationToken,
) {
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("User info purge stopped");
                    break;
                }
                _ = ticker.tick() => {
                    cache.cleanup_expired().await;
                }
            }
        }
    });
}
