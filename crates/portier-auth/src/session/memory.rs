//! Server-side session store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{SessionRecord, SessionStore};
use crate::cookie::CookieDirective;
use crate::error::Result;

type Entries = Arc<Mutex<HashMap<String, SessionRecord>>>;

/// Session records kept in process memory, keyed by a random UUID that
/// becomes the cookie value.
///
/// Expired records are dropped lazily on read and eagerly by an optional
/// background sweep. The sweep stops on [`shutdown`](Self::shutdown) or
/// when the store is dropped.
pub struct MemorySessionStore {
    entries: Entries,
    cancel: CancellationToken,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Create a store without a background sweep.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Create a store and start sweeping expired records every `interval`.
    ///
    /// Outside a tokio runtime no sweep is started and expired records are
    /// only dropped on read.
    pub fn with_sweep(interval: Duration) -> Self {
        let store = Self::new();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => spawn_sweeper(
                &handle,
                Arc::clone(&store.entries),
                interval,
                store.cancel.clone(),
            ),
            Err(_) => {
                warn!("No tokio runtime; session sweep disabled");
                store.cancel.cancel();
            }
        }
        store
    }

    /// Remove every record expired at `now`; returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        sweep(&self.entries, now)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn is_sweeping(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl SessionStore for MemorySessionStore {
    fn create_at(
        &self,
        previous: Option<&str>,
        record: SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<CookieDirective> {
        let id = previous
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let max_age = record.cookie_max_age(now);

        self.entries.lock().insert(id.clone(), record);
        Ok(CookieDirective::set(id, max_age))
    }

    fn read_at(&self, cookie_value: &str, now: DateTime<Utc>) -> Option<SessionRecord> {
        let mut entries = self.entries.lock();
        match entries.get(cookie_value) {
            Some(record) if record.is_valid_at(now) => Some(record.clone()),
            Some(_) => {
                entries.remove(cookie_value);
                debug!("Expired session removed on read");
                None
            }
            None => None,
        }
    }

    fn clear(&self, cookie_value: Option<&str>) -> Option<CookieDirective> {
        let value = cookie_value?;
        self.entries.lock().remove(value);
        Some(CookieDirective::delete())
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for MemorySessionStore {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn sweep(entries: &Mutex<HashMap<String, SessionRecord>>, now: DateTime<Utc>) -> usize {
    let mut entries = entries.lock();
    let before = entries.len();
    entries.retain(|_, record| record.is_valid_at(now));
    before - entries.len()
}

fn spawn_sweeper(
    handle: &tokio::runtime::Handle,
    entries: Entries,
    interval: Duration,
    cancel: CancellationToken,
) {
    handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Session sweep stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = sweep(&entries, Utc::now());
                    if removed > 0 {
                        debug!(count = removed, "Swept expired sessions");
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use chrono::Duration as ChronoDuration;

    fn pending(state: &str) -> Session {
        Session::PendingLogin {
            state: state.into(),
            nonce: "N".into(),
            code_verifier: "V".into(),
        }
    }

    #[test]
    fn test_create_and_read() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let directive = store
            .create_at(None, SessionRecord::new(pending("S1"), 120, now), now)
            .unwrap();

        assert_eq!(directive.max_age, Some(120));
        let id = directive.value.unwrap();
        let record = store.read_at(&id, now).unwrap();
        assert_eq!(record.session, pending("S1"));
    }

    #[test]
    fn test_expiry_at_max_age() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let id = store
            .create_at(None, SessionRecord::new(pending("S1"), 60, now), now)
            .unwrap()
            .value
            .unwrap();

        assert!(store.read_at(&id, now + ChronoDuration::seconds(59)).is_some());
        assert!(store.read_at(&id, now + ChronoDuration::seconds(60)).is_none());
        // Removed by the failed read, even for an earlier clock.
        assert!(store.read_at(&id, now).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_previous_id_supersedes_in_place() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let id = store
            .create_at(None, SessionRecord::new(pending("S1"), 120, now), now)
            .unwrap()
            .value
            .unwrap();
        let again = store
            .create_at(Some(&id), SessionRecord::new(pending("S2"), 120, now), now)
            .unwrap()
            .value
            .unwrap();

        assert_eq!(id, again);
        assert_eq!(store.len(), 1);
        assert_eq!(store.read_at(&id, now).unwrap().session, pending("S2"));
    }

    #[test]
    fn test_cookie_max_age_accounts_for_elapsed_time() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let created = now - ChronoDuration::seconds(100);
        let directive = store
            .create_at(None, SessionRecord::new(pending("S1"), 300, created), now)
            .unwrap();
        assert_eq!(directive.max_age, Some(200));
    }

    #[test]
    fn test_clear() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        let id = store
            .create_at(None, SessionRecord::new(pending("S1"), 120, now), now)
            .unwrap()
            .value
            .unwrap();

        assert_eq!(store.clear(Some(&id)), Some(CookieDirective::delete()));
        assert!(store.read_at(&id, now).is_none());
        assert_eq!(store.clear(None), None);
        // Unknown cookie still gets a deletion directive.
        assert!(store.clear(Some("unknown")).is_some());
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = MemorySessionStore::new();
        let now = Utc::now();
        store
            .create_at(None, SessionRecord::new(pending("old"), 10, now), now)
            .unwrap();
        store
            .create_at(None, SessionRecord::new(pending("new"), 1000, now), now)
            .unwrap();

        assert_eq!(store.sweep_at(now + ChronoDuration::seconds(30)), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sweep_disabled_outside_runtime() {
        let store = MemorySessionStore::with_sweep(Duration::from_secs(1));
        assert!(!store.is_sweeping());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_runs_and_stops() {
        let store = MemorySessionStore::with_sweep(Duration::from_secs(300));
        let past = Utc::now() - ChronoDuration::seconds(600);
        store
            .create_at(None, SessionRecord::new(pending("S1"), 60, past), past)
            .unwrap();
        assert_eq!(store.len(), 1);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert!(store.is_empty());

        store.shutdown();
        assert!(!store.is_sweeping());
    }
}
