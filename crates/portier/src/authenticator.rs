//! Builds the configured authenticator from the config file.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use portier_auth::oidc::config::DEFAULT_SWEEP_INTERVAL;
use portier_auth::{
    BasicAuthenticator, CookieKey, CookieOptions, OidcAuthenticator, OidcConfig, SameSite,
    SessionStoreKind, SharedAuthenticator,
};
use portier_cache::CacheConfig;
use portier_config::{
    BasicConfig, CookieSection, Mechanism, OidcSection, PortierConfig, SessionStoreChoice,
    UserInfoCacheSection, resolve_client_secret, resolve_cookie_key,
};
use tracing::{debug, info};

/// Build the authenticator selected by `[authentication] mechanism`.
///
/// Must run inside a tokio runtime so the memory session sweep can start.
pub fn build(config: &PortierConfig) -> Result<SharedAuthenticator> {
    config.validate()?;

    match config.mechanism() {
        Mechanism::Basic => {
            let basic = config.basic.clone().unwrap_or_default();
            info!(users = basic.users.len(), "Using basic authentication");
            Ok(Arc::new(basic_authenticator(basic)))
        }
        Mechanism::Oidc => {
            let section = config
                .oidc
                .as_ref()
                .context("mechanism is oidc but [oidc] is missing")?;
            let oidc = oidc_config(section)?;
            info!(provider = %oidc.provider_url, base_route = %oidc.base_route, "Using OpenID Connect");
            Ok(Arc::new(OidcAuthenticator::new(oidc)?))
        }
    }
}

pub fn basic_authenticator(config: BasicConfig) -> BasicAuthenticator {
    let authenticator = BasicAuthenticator::new(config.users);
    match config.realm {
        Some(realm) => authenticator.with_realm(realm),
        None => authenticator,
    }
}

/// Translate `[oidc]` into engine settings, resolving secrets on the way.
pub fn oidc_config(section: &OidcSection) -> Result<OidcConfig> {
    section.validate()?;

    let provider_url = section
        .provider_url
        .as_deref()
        .context("oidc.provider_url is required")?;
    let client_id = section
        .client_id
        .as_deref()
        .context("oidc.client_id is required")?;

    let client_secret = match resolve_client_secret(section) {
        Some(secret) => {
            debug!(source = %secret.source, "Resolved client secret");
            secret.value
        }
        None => String::new(),
    };

    let mut config = OidcConfig::new(provider_url, client_id, client_secret)
        .with_cookie(cookie_options(&section.cookie)?)
        .with_session_store(session_store(section)?)
        .with_user_info_cache(cache_config(&section.user_info_cache));

    if let Some(uri) = &section.redirect_uri {
        config = config.with_redirect_uri(uri);
    }
    if let Some(scope) = &section.scope {
        config = config.with_scope(scope);
    }
    if let Some(route) = &section.base_route {
        config = config.with_base_route(route);
    }
    if let Some(route) = &section.frontend_base_route {
        config = config.with_frontend_base_route(route);
    }
    if let Some(url) = &section.redirect_after_login {
        config = config.with_redirect_after_login(url);
    }
    if let Some(url) = &section.redirect_after_logout {
        config = config.with_redirect_after_logout(url);
    }
    if let Some(enabled) = section.validate_id_token {
        config = config.with_id_token_validation(enabled);
    }
    if let Some(enabled) = section.use_refresh_tokens {
        config = config.with_refresh_tokens(enabled);
    }
    if let Some(secs) = section.login_timeout_secs {
        config = config.with_login_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = section.session_max_age_secs {
        config = config.with_session_max_age(Duration::from_secs(secs));
    }

    config.validate()?;
    Ok(config)
}

fn cookie_options(section: &CookieSection) -> Result<CookieOptions> {
    let mut options = CookieOptions::default();
    if let Some(name) = &section.name {
        options = options.with_name(name);
    }
    if let Some(path) = &section.path {
        options = options.with_path(path);
    }
    if let Some(domain) = &section.domain {
        options = options.with_domain(domain);
    }
    if let Some(secure) = section.secure {
        options = options.with_secure(secure);
    }
    if let Some(http_only) = section.http_only {
        options = options.with_http_only(http_only);
    }
    if let Some(same_site) = &section.same_site {
        options = options.with_same_site(parse_same_site(same_site)?);
    }
    Ok(options)
}

fn parse_same_site(value: &str) -> Result<SameSite> {
    match value.to_ascii_lowercase().as_str() {
        "strict" => Ok(SameSite::Strict),
        "lax" => Ok(SameSite::Lax),
        "none" => Ok(SameSite::None),
        other => anyhow::bail!("invalid oidc.cookie.same_site: {other}"),
    }
}

fn session_store(section: &OidcSection) -> Result<SessionStoreKind> {
    match section.session.store {
        SessionStoreChoice::Memory => Ok(SessionStoreKind::Memory {
            sweep_interval: section
                .session
                .sweep_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SWEEP_INTERVAL),
        }),
        SessionStoreChoice::Cookie => {
            let secret = resolve_cookie_key(section)?;
            debug!(source = %secret.source, "Resolved cookie key");
            let key: CookieKey = secret
                .value
                .parse()
                .context("invalid oidc.session.cookie_key")?;
            Ok(SessionStoreKind::Cookie { key })
        }
    }
}

fn cache_config(section: &UserInfoCacheSection) -> CacheConfig {
    let mut config = CacheConfig::default();
    if let Some(max) = section.max_entries {
        config = config.with_max_entries(max);
    }
    match section.ttl_secs {
        Some(0) => config.without_ttl(),
        Some(secs) => config.with_ttl(Duration::from_secs(secs)),
        None => config,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
