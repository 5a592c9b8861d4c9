//! PKCE (S256) verifier/challenge pairs and anti-replay values.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AuthError, Result};

/// Code challenge method sent to the provider.
pub const CHALLENGE_METHOD: &str = "S256";

/// Values generated for one login attempt.
///
/// The verifier, state and nonce are kept in the pending session; only the
/// challenge, state and nonce travel to the provider.
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
    pub nonce: String,
}

impl PkceChallenge {
    /// Generate fresh values. The verifier is two random UUIDs joined by a
    /// dash, 73 characters from the unreserved set.
    pub fn generate() -> Self {
        let verifier = format!("{}-{}", Uuid::new_v4(), Uuid::new_v4());
        let challenge = s256_challenge(&verifier);

        Self {
            verifier,
            challenge,
            state: Uuid::new_v4().to_string(),
            nonce: Uuid::new_v4().to_string(),
        }
    }
}

/// `base64url_nopad(SHA256(verifier))`.
pub fn s256_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Compare the state stored with the pending login against the one the
/// provider echoed back.
pub fn verify_state(stored: &str, returned: &str) -> Result<()> {
    if constant_time_eq(stored, returned) {
        Ok(())
    } else {
        Err(AuthError::Replay("state does not match pending login".into()))
    }
}

/// Compare two strings in constant time.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}
