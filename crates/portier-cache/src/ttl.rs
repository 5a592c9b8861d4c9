//! TTL bookkeeping for cached entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Tracks when each key was stored so stale keys can be dropped.
#[derive(Debug)]
pub struct TtlTracker {
    stored_at: HashMap<String, Instant>,

    /// TTL duration (None means no expiration).
    ttl: Option<Duration>,
}

impl TtlTracker {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            stored_at: HashMap::new(),
            ttl,
        }
    }

    /// Record a (re)insertion of a key, restarting its TTL.
    pub fn stamp(&mut self, key: &str) {
        self.stored_at.insert(key.to_string(), Instant::now());
    }

    /// Check whether a key has outlived the TTL.
    pub fn is_expired(&self, key: &str) -> bool {
        match self.ttl {
            None => false,
            Some(ttl) => match self.stored_at.get(key) {
                None => true,
                Some(stored) => stored.elapsed() >= ttl,
            },
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.stored_at.remove(key);
    }

    /// Remove all expired keys and return them.
    pub fn drain_expired(&mut self) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let now = Instant::now();
        let expired: Vec<String> = self
            .stored_at
            .iter()
            .filter(|(_, stored)| now.duration_since(**stored) >= ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.stored_at.remove(key);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_no_ttl_never_expires() {
        let mut tracker = TtlTracker::new(None);
        tracker.stamp("a");

        assert!(!tracker.is_expired("a"));
        assert!(tracker.drain_expired().is_empty());
    }

    #[test]
    fn test_expiration() {
        let mut tracker = TtlTracker::new(Some(Duration::from_millis(10)));
        tracker.stamp("a");

        thread::sleep(Duration::from_millis(20));

        assert!(tracker.is_expired("a"));
    }

    #[test]
    fn test_restamp_restarts_timer() {
        let mut tracker = TtlTracker::new(Some(Duration::from_millis(50)));
        tracker.stamp("a");
        thread::sleep(Duration::from_millis(30));
        tracker.stamp("a");
        thread::sleep(Duration::from_millis(30));

        assert!(!tracker.is_expired("a"));
    }

    #[test]
    fn test_drain_expired() {
        let mut tracker = TtlTracker::new(Some(Duration::from_millis(10)));
        tracker.stamp("a");
        tracker.stamp("b");

        thread::sleep(Duration::from_millis(20));

        assert_eq!(tracker.drain_expired().len(), 2);
        assert!(tracker.drain_expired().is_empty());
    }

    #[test]
    fn test_unknown_key_is_expired() {
        let tracker = TtlTracker::new(Some(Duration::from_secs(60)));
        assert!(tracker.is_expired("missing"));
    }
}
