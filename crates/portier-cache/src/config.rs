//! Configuration for the expiring cache.

use std::time::Duration;

/// Default maximum number of cached entries.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default TTL for cached entries.
pub const DEFAULT_TTL: Option<Duration> = Some(Duration::from_secs(300));

/// Configuration for the expiring cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries to keep before LRU eviction.
    pub max_entries: usize,

    /// Optional time-to-live, measured from insertion.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: DEFAULT_TTL,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the TTL for cached entries.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Disable TTL (entries only leave through eviction or invalidation).
    pub fn without_ttl(mut self) -> Self {
        self.ttl = None;
        self
    }
}
