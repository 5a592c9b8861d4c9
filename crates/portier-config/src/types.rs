//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                   # listen address
//! [authentication]           # mechanism = "oidc" | "basic"
//! [basic.users]              # user name → password
//! [oidc]                     # provider, client and routes
//! [oidc.cookie]              # session cookie attributes
//! [oidc.session]             # session store
//! [oidc.user_info_cache]     # per-session user info cache
//! [logging]                  # log files
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default port of the `serve` command.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bind address of the `serve` command.
pub const DEFAULT_BIND: &str = "127.0.0.1";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortierConfig {
    pub server: Option<ServerConfig>,
    pub authentication: Option<AuthenticationConfig>,
    pub basic: Option<BasicConfig>,
    pub oidc: Option<OidcSection>,
    pub logging: Option<LoggingConfig>,
}

impl PortierConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, except `[basic.users]` which is merged
    /// per user.
    pub fn merge(&mut self, other: PortierConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        if other.authentication.is_some() {
            self.authentication = other.authentication;
        }

        match (&mut self.basic, other.basic) {
            (Some(base), Some(layer)) => {
                base.users.extend(layer.users);
                if layer.realm.is_some() {
                    base.realm = layer.realm;
                }
            }
            (base, layer @ Some(_)) => *base = layer,
            (_, None) => {}
        }

        if other.oidc.is_some() {
            self.oidc = other.oidc;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Selected mechanism; OIDC when `[authentication]` is absent.
    pub fn mechanism(&self) -> Mechanism {
        self.authentication
            .as_ref()
            .map(|a| a.mechanism)
            .unwrap_or_default()
    }

    /// Server settings, defaulted when the section is absent.
    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    /// Check that the selected mechanism has what it needs.
    ///
    /// Secrets are not checked here; they may come from the environment.
    pub fn validate(&self) -> Result<()> {
        match self.mechanism() {
            Mechanism::Basic => {
                let users = self.basic.as_ref().map(|b| b.users.len()).unwrap_or(0);
                if users == 0 {
                    return Err(ConfigError::MissingField {
                        field: "users".to_string(),
                        context: "[basic]".to_string(),
                    });
                }
            }
            Mechanism::Oidc => {
                let oidc = self.oidc.as_ref().ok_or_else(|| ConfigError::MissingField {
                    field: "oidc".to_string(),
                    context: "config (mechanism = \"oidc\")".to_string(),
                })?;
                oidc.validate()?;
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Address to bind to.
    pub bind: String,
    /// Enable request tracing.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            request_logging: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authentication Mechanism
// ─────────────────────────────────────────────────────────────────────────────

/// `[authentication]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticationConfig {
    pub mechanism: Mechanism,
}

/// Which authenticator guards the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mechanism {
    #[default]
    Oidc,
    Basic,
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mechanism::Oidc => write!(f, "oidc"),
            Mechanism::Basic => write!(f, "basic"),
        }
    }
}

/// `[basic]` section: static credentials.
///
/// ```toml
/// [basic]
/// realm = "internal"
///
/// [basic.users]
/// alice = "correct horse"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub realm: Option<String>,
    pub users: HashMap<String, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OIDC Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// `[oidc]` section.
///
/// Unset optional values fall back to the authenticator's own defaults.
///
/// ```toml
/// [oidc]
/// provider_url = "https://id.example.com/realms/main"
/// client_id = "portier"
/// base_route = "/api/authentication"
///
/// [oidc.session]
/// store = "cookie"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OidcSection {
    pub provider_url: Option<String>,
    pub client_id: Option<String>,
    /// Prefer `PORTIER_OIDC_CLIENT_SECRET`; a value here triggers a warning.
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub base_route: Option<String>,
    pub frontend_base_route: Option<String>,
    pub redirect_after_login: Option<String>,
    pub redirect_after_logout: Option<String>,
    pub validate_id_token: Option<bool>,
    pub use_refresh_tokens: Option<bool>,
    pub login_timeout_secs: Option<u64>,
    pub session_max_age_secs: Option<u64>,
    pub cookie: CookieSection,
    pub session: SessionSection,
    pub user_info_cache: UserInfoCacheSection,
}

impl OidcSection {
    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("provider_url", &self.provider_url),
            ("client_id", &self.client_id),
        ] {
            if value.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::MissingField {
                    field: field.to_string(),
                    context: "[oidc]".to_string(),
                });
            }
        }

        for (field, value) in [
            ("base_route", &self.base_route),
            ("frontend_base_route", &self.frontend_base_route),
        ] {
            if let Some(route) = value
                && !route.starts_with('/')
            {
                return Err(ConfigError::InvalidValue {
                    field: format!("oidc.{field}"),
                    reason: format!("must start with '/', got '{route}'"),
                });
            }
        }

        for (field, value) in [
            ("login_timeout_secs", self.login_timeout_secs),
            ("session_max_age_secs", self.session_max_age_secs),
            ("session.sweep_interval_secs", self.session.sweep_interval_secs),
        ] {
            if value == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: format!("oidc.{field}"),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if let Some(same_site) = &self.cookie.same_site
            && !matches!(
                same_site.to_ascii_lowercase().as_str(),
                "strict" | "lax" | "none"
            )
        {
            return Err(ConfigError::InvalidValue {
                field: "oidc.cookie.same_site".to_string(),
                reason: format!("expected strict, lax or none, got '{same_site}'"),
            });
        }

        Ok(())
    }

    /// Whether a secret is stored in plaintext in this section.
    pub fn plaintext_secrets(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.client_secret.is_some() {
            found.push("client_secret");
        }
        if self.session.cookie_key.is_some() {
            found.push("session.cookie_key");
        }
        found
    }
}

/// `[oidc.cookie]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSection {
    pub name: Option<String>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: Option<bool>,
    pub http_only: Option<bool>,
    /// `strict`, `lax` or `none`.
    pub same_site: Option<String>,
}

/// `[oidc.session]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub store: SessionStoreChoice,
    /// Sweep interval of the memory store.
    pub sweep_interval_secs: Option<u64>,
    /// 64 hex characters, or `unencrypted`. Prefer `PORTIER_COOKIE_KEY`.
    pub cookie_key: Option<String>,
}

/// Where sessions are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreChoice {
    #[default]
    Memory,
    Cookie,
}

/// `[oidc.user_info_cache]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserInfoCacheSection {
    pub max_entries: Option<usize>,
    /// Entry lifetime; `0` disables expiry.
    pub ttl_secs: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rolling JSON log files. Console only when unset.
    pub dir: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
