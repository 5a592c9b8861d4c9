//! Secret resolution with provenance.
//!
//! Resolution order:
//! 1. Environment variable
//! 2. Config file (with warning at load time)

use crate::{ConfigError, OidcSection, Result};

/// Env var holding the OIDC client secret.
pub const CLIENT_SECRET_ENV: &str = "PORTIER_OIDC_CLIENT_SECRET";

/// Env var holding the session cookie key.
pub const COOKIE_KEY_ENV: &str = "PORTIER_COOKIE_KEY";

/// A secret value and where it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve a secret from `env_var`, falling back to `config_value`.
///
/// Empty values count as unset.
pub fn resolve_secret(env_var: &str, config_value: Option<&str>) -> Option<ResolvedSecret> {
    if let Ok(value) = std::env::var(env_var)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var.to_string()),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Resolve the OIDC client secret. Public clients may leave it unset.
pub fn resolve_client_secret(oidc: &OidcSection) -> Option<ResolvedSecret> {
    resolve_secret(CLIENT_SECRET_ENV, oidc.client_secret.as_deref())
}

/// Resolve the cookie key; required when sessions live in the cookie.
pub fn resolve_cookie_key(oidc: &OidcSection) -> Result<ResolvedSecret> {
    resolve_secret(COOKIE_KEY_ENV, oidc.session.cookie_key.as_deref()).ok_or_else(|| {
        ConfigError::SecretNotFound {
            name: "oidc.session.cookie_key".to_string(),
            env_var: COOKIE_KEY_ENV.to_string(),
        }
    })
}
