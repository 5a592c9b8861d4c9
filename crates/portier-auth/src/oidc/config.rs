//! OpenID Connect engine configuration.

use std::time::Duration;

use portier_cache::CacheConfig;

use crate::cookie::CookieOptions;
use crate::error::{AuthError, Result};
use crate::session::CookieKey;

/// Default mount point of the login/callback/logout routes.
pub const DEFAULT_BASE_ROUTE: &str = "/api/authentication";

/// Default scope requested at the authorization endpoint.
pub const DEFAULT_SCOPE: &str = "openid profile email";

/// Default lifetime of a pending login.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(120);

/// Session lifetime used when the provider does not send `expires_in`.
pub const DEFAULT_SESSION_MAX_AGE: Duration = Duration::from_secs(3600);

/// Default interval of the in-memory session sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Where session records live.
#[derive(Debug, Clone)]
pub enum SessionStoreKind {
    /// Server-side map keyed by a random cookie value.
    Memory { sweep_interval: Duration },
    /// The whole record sealed into the cookie.
    Cookie { key: CookieKey },
}

impl Default for SessionStoreKind {
    fn default() -> Self {
        SessionStoreKind::Memory {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Configuration for [`OidcAuthenticator`](crate::OidcAuthenticator).
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer URL; discovery lives under `/.well-known/openid-configuration`.
    pub provider_url: String,
    pub client_id: String,
    pub client_secret: String,

    /// Fixed redirect URI. When unset, derived from the request origin and
    /// the frontend base route.
    pub redirect_uri: Option<String>,
    pub scope: String,

    /// Prefix of the login, callback and logout routes. `/` means none.
    pub base_route: String,

    /// Prefix used in URLs handed to browsers. Defaults to `base_route`.
    pub frontend_base_route: Option<String>,

    pub redirect_after_login: String,
    pub redirect_after_logout: String,

    /// Require and validate an ID token on callback.
    pub validate_id_token: bool,

    /// Require `refresh_token` grant support and refresh rejected tokens.
    pub use_refresh_tokens: bool,

    pub login_timeout: Duration,
    pub session_max_age: Duration,

    pub cookie: CookieOptions,
    pub session_store: SessionStoreKind,
    pub user_info_cache: CacheConfig,
}

impl OidcConfig {
    pub fn new(
        provider_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            provider_url: provider_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: None,
            scope: DEFAULT_SCOPE.to_string(),
            base_route: DEFAULT_BASE_ROUTE.to_string(),
            frontend_base_route: None,
            redirect_after_login: "/".to_string(),
            redirect_after_logout: "/".to_string(),
            validate_id_token: true,
            use_refresh_tokens: true,
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            session_max_age: DEFAULT_SESSION_MAX_AGE,
            cookie: CookieOptions::default(),
            session_store: SessionStoreKind::default(),
            user_info_cache: CacheConfig::default(),
        }
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_base_route(mut self, route: impl Into<String>) -> Self {
        self.base_route = route.into();
        self
    }

    pub fn with_frontend_base_route(mut self, route: impl Into<String>) -> Self {
        self.frontend_base_route = Some(route.into());
        self
    }

    pub fn with_redirect_after_login(mut self, url: impl Into<String>) -> Self {
        self.redirect_after_login = url.into();
        self
    }

    pub fn with_redirect_after_logout(mut self, url: impl Into<String>) -> Self {
        self.redirect_after_logout = url.into();
        self
    }

    pub fn with_id_token_validation(mut self, enabled: bool) -> Self {
        self.validate_id_token = enabled;
        self
    }

    pub fn with_refresh_tokens(mut self, enabled: bool) -> Self {
        self.use_refresh_tokens = enabled;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    pub fn with_cookie(mut self, cookie: CookieOptions) -> Self {
        self.cookie = cookie;
        self
    }

    pub fn with_session_store(mut self, store: SessionStoreKind) -> Self {
        self.session_store = store;
        self
    }

    pub fn with_user_info_cache(mut self, cache: CacheConfig) -> Self {
        self.user_info_cache = cache;
        self
    }

    /// Check the settings that cannot be defaulted.
    pub fn validate(&self) -> Result<()> {
        let provider = url::Url::parse(&self.provider_url)
            .map_err(|e| AuthError::Config(format!("invalid provider_url: {e}")))?;
        if !matches!(provider.scheme(), "http" | "https") {
            return Err(AuthError::Config(format!(
                "provider_url must be http(s), got {}",
                provider.scheme()
            )));
        }
        if self.client_id.is_empty() {
            return Err(AuthError::Config("client_id is empty".into()));
        }
        if !self.base_route.starts_with('/') {
            return Err(AuthError::Config(format!(
                "base_route must start with '/': {}",
                self.base_route
            )));
        }
        if let Some(uri) = &self.redirect_uri {
            url::Url::parse(uri)
                .map_err(|e| AuthError::Config(format!("invalid redirect_uri: {e}")))?;
        }
        Ok(())
    }

    /// Full path of an engine route, e.g. `route("login")`.
    pub fn route(&self, name: &str) -> String {
        format!("{}/{}", route_prefix(&self.base_route), name)
    }

    /// Browser-facing path of an engine route.
    pub fn frontend_route(&self, name: &str) -> String {
        let base = self.frontend_base_route.as_deref().unwrap_or(&self.base_route);
        format!("{}/{}", route_prefix(base), name)
    }

    /// Provider URL without a trailing slash, as compared against `iss`.
    pub fn issuer(&self) -> &str {
        self.provider_url.trim_end_matches('/')
    }
}

fn route_prefix(base: &str) -> &str {
    if base == "/" {
        ""
    } else {
        base.trim_end_matches('/')
    }
}
