//! ID token claim validation.
//!
//! The token is received directly from the token endpoint over the
//! back channel, so only the claims are checked: audience, issue time,
//! issuer and nonce, in that order.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{AuthError, Result};
use crate::oidc::pkce::constant_time_eq;

/// Claims the engine relies on after validation.
#[derive(Debug, Clone)]
pub struct IdTokenClaims {
    /// Issue time, seconds since the epoch.
    pub iat: i64,
    pub subject: Option<String>,
    pub claims: Value,
}

impl IdTokenClaims {
    /// Issue time as a timestamp; used as the session's creation time.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.iat, 0)
    }
}

/// Validates ID tokens for one client against one issuer.
#[derive(Debug, Clone)]
pub struct IdTokenValidator {
    client_id: String,
    issuer: String,
}

impl IdTokenValidator {
    pub fn new(client_id: impl Into<String>, issuer: &str) -> Self {
        Self {
            client_id: client_id.into(),
            issuer: issuer.trim_end_matches('/').to_string(),
        }
    }

    pub fn validate(&self, id_token: &str, expected_nonce: &str) -> Result<IdTokenClaims> {
        let claims = decode_payload(id_token)?;

        if !self.audience_matches(claims.get("aud")) {
            return Err(AuthError::InvalidIdToken("aud does not name this client".into()));
        }

        let iat = claims
            .get("iat")
            .and_then(Value::as_f64)
            .ok_or_else(|| AuthError::InvalidIdToken("iat missing".into()))? as i64;

        let issuer = claims
            .get("iss")
            .and_then(Value::as_str)
            .map(|iss| iss.trim_end_matches('/'));
        if issuer != Some(self.issuer.as_str()) {
            return Err(AuthError::InvalidIdToken(format!(
                "iss {:?} does not match {}",
                issuer, self.issuer
            )));
        }

        let nonce = claims.get("nonce").and_then(Value::as_str).unwrap_or_default();
        if !constant_time_eq(nonce, expected_nonce) {
            return Err(AuthError::InvalidIdToken("nonce mismatch".into()));
        }

        Ok(IdTokenClaims {
            iat,
            subject: claims.get("sub").and_then(Value::as_str).map(str::to_string),
            claims,
        })
    }

    fn audience_matches(&self, aud: Option<&Value>) -> bool {
        match aud {
            Some(Value::String(aud)) => *aud == self.client_id,
            Some(Value::Array(auds)) => auds
                .iter()
                .any(|a| a.as_str() == Some(self.client_id.as_str())),
            _ => false,
        }
    }
}

fn decode_payload(id_token: &str) -> Result<Value> {
    let segments: Vec<&str> = id_token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(AuthError::InvalidIdToken(format!(
            "expected 3 segments, got {}",
            segments.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidIdToken(format!("payload is not base64url: {e}")))?;

    let claims: Value = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidIdToken(format!("payload is not JSON: {e}")))?;
    if !claims.is_object() {
        return Err(AuthError::InvalidIdToken("payload is not an object".into()));
    }
    Ok(claims)
}
