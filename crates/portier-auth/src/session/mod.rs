//! Login sessions and where they are kept.
//!
//! A session is either a pending login (PKCE verifier, state, nonce) or an
//! authenticated one (tokens, optionally the user info). Records carry
//! their creation time and lifetime; an expired record is treated exactly
//! like a missing one.
//!
//! Two stores implement [`SessionStore`]:
//! - [`MemorySessionStore`]: server-side map keyed by a random cookie value,
//!   swept periodically
//! - [`CookieSessionStore`]: the record sealed with AES-256-CBC into the
//!   cookie itself

mod encrypted;
mod locks;
mod memory;

pub use encrypted::{CookieKey, CookieSessionStore, MAX_COOKIE_LEN, UNENCRYPTED_COOKIE_KEY};
pub use locks::{SessionLock, SessionLocks};
pub use memory::MemorySessionStore;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cookie::{CookieDirective, remaining_max_age};
use crate::error::Result;
use crate::identity::UserInfo;

/// Session contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Session {
    /// Waiting for the provider to redirect back to the callback.
    PendingLogin {
        state: String,
        nonce: String,
        code_verifier: String,
    },
    /// Tokens obtained from the provider.
    Authenticated {
        token_type: String,
        access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_info: Option<UserInfo>,
    },
}

impl Session {
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { access_token, .. } => Some(access_token),
            Session::PendingLogin { .. } => None,
        }
    }
}

/// A session with its lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub created_at: DateTime<Utc>,
    /// Lifetime in seconds, counted from `created_at`.
    pub max_age: i64,
}

impl SessionRecord {
    pub fn new(session: Session, max_age: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            session,
            created_at,
            max_age,
        }
    }

    /// A record is valid while strictly less than `max_age` has elapsed.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_milliseconds() < self.max_age.saturating_mul(1000)
    }

    /// Cookie lifetime left at `now`.
    pub fn cookie_max_age(&self, now: DateTime<Utc>) -> i64 {
        remaining_max_age(self.max_age, self.created_at, now)
    }
}

/// Persistence strategy for session records.
///
/// Operations are synchronous and each one is atomic with respect to the
/// others; an expired record found by `read` is removed in the same step.
pub trait SessionStore: Send + Sync {
    /// Store a record and return the cookie that refers to it.
    ///
    /// `previous` is the caller's current cookie value; stores that key
    /// records by it replace that record in place.
    fn create_at(
        &self,
        previous: Option<&str>,
        record: SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<CookieDirective>;

    /// Look up a record. Unknown, undecryptable and expired records are
    /// all absent.
    fn read_at(&self, cookie_value: &str, now: DateTime<Utc>) -> Option<SessionRecord>;

    /// Forget the record behind `cookie_value`. Returns a deletion
    /// directive only when the request actually carried a cookie.
    fn clear(&self, cookie_value: Option<&str>) -> Option<CookieDirective>;

    /// Stop background work. Stores without any treat this as a no-op.
    fn shutdown(&self) {}

    /// Whether the whole record travels in the cookie. Such stores should
    /// be given as little as possible to keep under the browser's limit.
    fn is_client_side(&self) -> bool {
        false
    }

    fn create(&self, previous: Option<&str>, record: SessionRecord) -> Result<CookieDirective> {
        self.create_at(previous, record, Utc::now())
    }

    fn read(&self, cookie_value: &str) -> Option<SessionRecord> {
        self.read_at(cookie_value, Utc::now())
    }
}

/// Shared session store handle.
pub type SharedSessionStore = Arc<dyn SessionStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending() -> Session {
        Session::PendingLogin {
            state: "S1".into(),
            nonce: "N1".into(),
            code_verifier: "V1".into(),
        }
    }

    #[test]
    fn test_validity_boundary() {
        let created = Utc::now();
        let record = SessionRecord::new(pending(), 120, created);

        assert!(record.is_valid_at(created));
        assert!(record.is_valid_at(created + Duration::milliseconds(119_999)));
        assert!(!record.is_valid_at(created + Duration::seconds(120)));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(pending()).unwrap();
        assert_eq!(value["phase"], "pending_login");
        assert_eq!(value["code_verifier"], "V1");

        let authenticated = Session::Authenticated {
            token_type: "Bearer".into(),
            access_token: "A1".into(),
            refresh_token: None,
            user_info: None,
        };
        let value = serde_json::to_value(&authenticated).unwrap();
        assert_eq!(value["phase"], "authenticated");
        assert!(value.get("refresh_token").is_none());
        assert_eq!(authenticated.access_token(), Some("A1"));
        assert!(pending().access_token().is_none());
    }
}
