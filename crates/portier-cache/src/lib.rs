//! Bounded cache with LRU eviction and TTL expiry.
//!
//! Used to keep provider responses (user info) around for a short while
//! without letting memory grow with the number of sessions ever seen:
//! - LRU eviction once `max_entries` is reached
//! - Optional TTL measured from insertion, so stale values age out even
//!   when they are read constantly
//!
//! # Example
//!
//! ```rust,ignore
//! use portier_cache::{CacheConfig, ExpiringCache};
//!
//! let config = CacheConfig::default()
//!     .with_max_entries(1000)
//!     .with_ttl(Duration::from_secs(300));
//!
//! let cache: ExpiringCache<String> = ExpiringCache::new(config);
//! ```

mod cache;
mod config;
mod ttl;

pub use cache::ExpiringCache;
pub use config::CacheConfig;
