//! Stateless session store: the record travels in the cookie.
//!
//! Cookie value layout: `base64(hex(ciphertext) ":" hex(iv))`, where the
//! ciphertext is the JSON record under AES-256-CBC with PKCS#7 padding and a
//! fresh 16-byte IV per write. With [`CookieKey::Unencrypted`] the value is
//! `hex(json)` instead.

use std::str::FromStr;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use tracing::{debug, warn};

use super::{SessionRecord, SessionStore};
use crate::cookie::CookieDirective;
use crate::error::{AuthError, Result};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Key value that turns encryption off. Never a default.
pub const UNENCRYPTED_COOKIE_KEY: &str = "unencrypted";

const IV_LEN: usize = 16;

/// Largest cookie value browsers reliably keep.
pub const MAX_COOKIE_LEN: usize = 4096;

/// Key for sealing session cookies.
#[derive(Clone, PartialEq, Eq)]
pub enum CookieKey {
    Aes256([u8; 32]),
    /// Store records as hex-encoded plaintext.
    Unencrypted,
}

impl CookieKey {
    /// Generate a random AES-256 key.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        CookieKey::Aes256(key)
    }

    /// Key in its configuration form.
    pub fn to_config_string(&self) -> String {
        match self {
            CookieKey::Aes256(key) => hex::encode(key),
            CookieKey::Unencrypted => UNENCRYPTED_COOKIE_KEY.to_string(),
        }
    }
}

impl FromStr for CookieKey {
    type Err = AuthError;

    /// Parse 64 hex characters, or the `unencrypted` sentinel.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == UNENCRYPTED_COOKIE_KEY {
            return Ok(CookieKey::Unencrypted);
        }
        let bytes = hex::decode(s)
            .map_err(|e| AuthError::Config(format!("cookie key is not hex: {e}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            AuthError::Config(format!(
                "cookie key must be 32 bytes (64 hex chars), got {}",
                bytes.len()
            ))
        })?;
        Ok(CookieKey::Aes256(key))
    }
}

impl std::fmt::Debug for CookieKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookieKey::Aes256(_) => f.write_str("CookieKey::Aes256(<redacted>)"),
            CookieKey::Unencrypted => f.write_str("CookieKey::Unencrypted"),
        }
    }
}

/// Session store that seals the whole record into the cookie value.
///
/// Nothing is kept server-side: `clear` only produces a deletion cookie,
/// and a copied cookie stays usable until its record expires.
#[derive(Debug, Clone)]
pub struct CookieSessionStore {
    key: CookieKey,
}

impl CookieSessionStore {
    pub fn new(key: CookieKey) -> Self {
        if key == CookieKey::Unencrypted {
            warn!("Session cookies are NOT encrypted; use only for local development");
        }
        Self { key }
    }

    /// Serialize and seal a record.
    pub fn seal(&self, record: &SessionRecord) -> Result<String> {
        let json = serde_json::to_vec(record)
            .map_err(|e| AuthError::Cookie(format!("Failed to serialize session: {}", e)))?;

        match &self.key {
            CookieKey::Unencrypted => Ok(hex::encode(json)),
            CookieKey::Aes256(key) => {
                let mut iv = [0u8; IV_LEN];
                rand::rng().fill_bytes(&mut iv);

                let ciphertext = Aes256CbcEnc::new(key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<Pkcs7>(&json);

                let joined = format!("{}:{}", hex::encode(ciphertext), hex::encode(iv));
                Ok(STANDARD.encode(joined))
            }
        }
    }

    /// Open a sealed record. Any decoding, decryption or parse failure
    /// yields `None`.
    pub fn open(&self, value: &str) -> Option<SessionRecord> {
        let json = match &self.key {
            CookieKey::Unencrypted => hex::decode(value).ok()?,
            CookieKey::Aes256(key) => {
                let joined = String::from_utf8(STANDARD.decode(value).ok()?).ok()?;
                let (ciphertext_hex, iv_hex) = joined.split_once(':')?;
                let ciphertext = hex::decode(ciphertext_hex).ok()?;
                let iv: [u8; IV_LEN] = hex::decode(iv_hex).ok()?.try_into().ok()?;

                Aes256CbcDec::new(key.into(), &iv.into())
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                    .ok()?
            }
        };
        serde_json::from_slice(&json).ok()
    }
}

impl SessionStore for CookieSessionStore {
    fn create_at(
        &self,
        _previous: Option<&str>,
        record: SessionRecord,
        now: DateTime<Utc>,
    ) -> Result<CookieDirective> {
        let max_age = record.cookie_max_age(now);
        let sealed = self.seal(&record)?;
        if sealed.len() > MAX_COOKIE_LEN {
            warn!(
                len = sealed.len(),
                limit = MAX_COOKIE_LEN,
                "Sealed session exceeds the browser cookie limit and may be dropped"
            );
        }
        Ok(CookieDirective::set(sealed, max_age))
    }

    fn read_at(&self, cookie_value: &str, now: DateTime<Utc>) -> Option<SessionRecord> {
        let Some(record) = self.open(cookie_value) else {
            debug!("Session cookie could not be opened");
            return None;
        };
        record.is_valid_at(now).then_some(record)
    }

    fn clear(&self, cookie_value: Option<&str>) -> Option<CookieDirective> {
        cookie_value.map(|_| CookieDirective::delete())
    }

    fn is_client_side(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::UserInfo;
    use crate::session::Session;
    use chrono::Duration;

    fn authenticated() -> Session {
        Session::Authenticated {
            token_type: "Bearer".into(),
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
            user_info: Some(UserInfo::from_user_name("alice")),
        }
    }

    fn store() -> CookieSessionStore {
        CookieSessionStore::new(CookieKey::generate())
    }

    #[test]
    fn test_sealed_record_opens() {
        let store = store();
        let now = Utc::now();
        let record = SessionRecord::new(authenticated(), 300, now);
        let directive = store.create_at(None, record.clone(), now).unwrap();

        let value = directive.value.unwrap();
        assert!(!value.contains("A1"));
        assert_eq!(store.read_at(&value, now), Some(record));
    }

    #[test]
    fn test_fresh_iv_per_write() {
        let store = store();
        let record = SessionRecord::new(authenticated(), 300, Utc::now());
        assert_ne!(store.seal(&record).unwrap(), store.seal(&record).unwrap());
    }

    #[test]
    fn test_value_layout() {
        let store = store();
        let sealed = store
            .seal(&SessionRecord::new(authenticated(), 300, Utc::now()))
            .unwrap();
        let joined = String::from_utf8(STANDARD.decode(sealed).unwrap()).unwrap();
        let (ciphertext, iv) = joined.split_once(':').unwrap();

        assert_eq!(iv.len(), 32);
        assert_eq!(hex::decode(ciphertext).unwrap().len() % 16, 0);
    }

    #[test]
    fn test_wrong_key_is_absent() {
        let now = Utc::now();
        let sealed = store()
            .seal(&SessionRecord::new(authenticated(), 300, now))
            .unwrap();
        assert!(store().read_at(&sealed, now).is_none());
    }

    #[test]
    fn test_tampered_value_is_absent() {
        let store = store();
        let now = Utc::now();
        assert!(store.read_at("not base64!", now).is_none());
        assert!(store.read_at(&STANDARD.encode("zz:zz"), now).is_none());
        assert!(store.read_at(&STANDARD.encode("no-separator"), now).is_none());
    }

    #[test]
    fn test_expired_record_is_absent() {
        let store = store();
        let now = Utc::now();
        let value = store
            .create_at(None, SessionRecord::new(authenticated(), 60, now), now)
            .unwrap()
            .value
            .unwrap();
        assert!(store.read_at(&value, now + Duration::seconds(59)).is_some());
        assert!(store.read_at(&value, now + Duration::seconds(60)).is_none());
    }

    #[test]
    fn test_unencrypted_sentinel() {
        let store = CookieSessionStore::new(UNENCRYPTED_COOKIE_KEY.parse().unwrap());
        let now = Utc::now();
        let record = SessionRecord::new(authenticated(), 300, now);
        let sealed = store.seal(&record).unwrap();

        let json = String::from_utf8(hex::decode(&sealed).unwrap()).unwrap();
        assert!(json.contains("\"access_token\":\"A1\""));
        assert_eq!(store.read_at(&sealed, now), Some(record));
    }

    #[test]
    fn test_oversized_record_is_still_issued() {
        let store = store();
        let now = Utc::now();
        let session = Session::Authenticated {
            token_type: "Bearer".into(),
            access_token: "A".repeat(2000),
            refresh_token: None,
            user_info: None,
        };
        let value = store
            .create_at(None, SessionRecord::new(session, 300, now), now)
            .unwrap()
            .value
            .unwrap();

        assert!(value.len() > MAX_COOKIE_LEN);
        assert!(store.is_client_side());
    }

    #[test]
    fn test_clear_only_with_cookie() {
        let store = store();
        assert_eq!(store.clear(None), None);
        assert_eq!(store.clear(Some("x")), Some(CookieDirective::delete()));
    }

    #[test]
    fn test_key_parsing() {
        let key = CookieKey::generate();
        let parsed: CookieKey = key.to_config_string().parse().unwrap();
        assert_eq!(parsed, key);

        assert!("abcd".parse::<CookieKey>().is_err());
        assert!("xyz".parse::<CookieKey>().is_err());
        assert!(!format!("{key:?}").contains(&key.to_config_string()));
    }
}
