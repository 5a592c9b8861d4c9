//! Per-session mutual exclusion for read-modify-write sequences.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Async locks keyed by session cookie value.
///
/// Refresh and logout hold the lock for their cookie across provider calls,
/// so a rotated refresh token is spent once and a cleared session is not
/// written back. Slots are dropped when their last holder releases them.
#[derive(Default)]
pub struct SessionLocks {
    slots: Slots,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> SessionLock {
        let slot = Arc::clone(
            self.slots
                .lock()
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        );
        let guard = slot.lock_owned().await;
        SessionLock {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Keys with a holder or waiter.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

/// Held access to one session key.
pub struct SessionLock {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        // Release first; waiters already hold their own clone of the slot.
        drop(self.guard.take());
        if let Some(slot) = slots.get(&self.key)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(&self.key);
        }
    }
}
