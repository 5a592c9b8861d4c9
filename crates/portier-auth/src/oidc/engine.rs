//! OpenID Connect authentication engine.
//!
//! Session lifecycle: anonymous → pending login (after `/login`) →
//! authenticated (after a successful `/callback`) → anonymous (after
//! `/logout`, expiry, or a failed refresh).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::{
        HeaderMap, HeaderValue, Method, StatusCode,
        header::{ACCEPT, ALLOW, HOST, LOCATION},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::authenticator::{Authentication, Authenticator};
use crate::cookie::CookieDirective;
use crate::error::{AuthError, Result};
use crate::identity::UserInfo;
use crate::oidc::config::{OidcConfig, SessionStoreKind};
use crate::oidc::discovery::{ProviderConfig, ProviderDirectory};
use crate::oidc::id_token::IdTokenValidator;
use crate::oidc::pkce::{CHALLENGE_METHOD, PkceChallenge, verify_state};
use crate::oidc::token::{TokenExchanger, TokenResponse};
use crate::session::{
    CookieSessionStore, MemorySessionStore, Session, SessionLocks, SessionRecord,
    SharedSessionStore,
};
use crate::user_info_cache::UserInfoCache;

/// Header telling API clients where the login page is.
pub const FRONTEND_URL_HEADER: &str = "x-flux-authentication-frontend-url";

const INVALID_AUTHORIZATION: &str = "Invalid authorization";
const AUTHORIZATION_NEEDED: &str = "Authorization needed";

/// What a protected request's session resolved to.
enum Resolution {
    User(UserInfo, Vec<CookieDirective>),
    /// A login is in flight; leave its session alone.
    Pending,
    Anonymous,
    /// The session was already cleared; send these directives.
    Ended(Vec<CookieDirective>),
}

/// OpenID Connect Authorization Code + PKCE authenticator.
///
/// Serves `{base_route}/login`, `/callback` and `/logout` itself and
/// resolves every other request to the session's user info.
pub struct OidcAuthenticator {
    config: OidcConfig,
    directory: ProviderDirectory,
    tokens: TokenExchanger,
    id_tokens: IdTokenValidator,
    sessions: SharedSessionStore,
    user_infos: UserInfoCache,
    locks: SessionLocks,
}

impl OidcAuthenticator {
    /// Build the engine with the session store named in `config`.
    ///
    /// A memory store started here sweeps on the current tokio runtime.
    pub fn new(config: OidcConfig) -> Result<Self> {
        let sessions: SharedSessionStore = match &config.session_store {
            SessionStoreKind::Memory { sweep_interval } => {
                Arc::new(MemorySessionStore::with_sweep(*sweep_interval))
            }
            SessionStoreKind::Cookie { key } => Arc::new(CookieSessionStore::new(key.clone())),
        };
        Self::with_store(config, sessions)
    }

    /// Build the engine around an existing session store.
    pub fn with_store(config: OidcConfig, sessions: SharedSessionStore) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("portier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let directory =
            ProviderDirectory::new(http.clone(), &config.provider_url, config.use_refresh_tokens);
        let tokens = TokenExchanger::new(http, &config.client_id, &config.client_secret);
        let id_tokens = IdTokenValidator::new(&config.client_id, config.issuer());
        let user_infos = UserInfoCache::with_purge(config.user_info_cache.clone());

        Ok(Self {
            config,
            directory,
            tokens,
            id_tokens,
            sessions,
            user_infos,
            locks: SessionLocks::new(),
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    pub fn directory(&self) -> &ProviderDirectory {
        &self.directory
    }

    pub fn user_info_cache(&self) -> &UserInfoCache {
        &self.user_infos
    }

    // ─────────────────────────────────────────────────────────────────────
    // Routes
    // ─────────────────────────────────────────────────────────────────────

    /// `GET {base}/login`: start a login and send the browser to the
    /// provider.
    pub async fn login(&self, request: &Parts) -> Response {
        let provider = match self.directory.config().await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "Cannot start login");
                return e.into_response();
            }
        };

        let pkce = PkceChallenge::generate();
        let location = match self.authorization_url(&provider, &pkce, request) {
            Ok(location) => location,
            Err(e) => return e.into_response(),
        };

        let cookie = self.config.cookie.read(&request.headers);
        let _lock = match cookie.as_deref() {
            Some(value) => Some(self.locks.lock(value).await),
            None => None,
        };
        let mut existing = None;
        if let Some(value) = cookie.as_deref() {
            self.user_infos.invalidate(value).await;
            if self.sessions.read(value).is_some() {
                existing = Some(value);
            }
        }

        let now = Utc::now();
        let record = SessionRecord::new(
            Session::PendingLogin {
                state: pkce.state,
                nonce: pkce.nonce,
                code_verifier: pkce.verifier,
            },
            self.config.login_timeout.as_secs() as i64,
            now,
        );

        match self.sessions.create_at(existing, record, now) {
            Ok(directive) => self.redirect(&location, &[directive]),
            Err(e) => e.into_response(),
        }
    }

    /// `GET {base}/callback`: finish a login.
    ///
    /// Any failure clears the pending session and answers 403.
    pub async fn callback(&self, request: &Parts) -> Response {
        let cookie = self.config.cookie.read(&request.headers);
        let pending = cookie.as_deref().and_then(|value| self.sessions.read(value));

        let record = match self.complete_login(request, pending).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Login callback rejected");
                let cleared: Vec<_> = self.sessions.clear(cookie.as_deref()).into_iter().collect();
                return self.text(StatusCode::FORBIDDEN, INVALID_AUTHORIZATION, &cleared);
            }
        };

        // The pre-login identifier is retired; the authenticated session
        // gets a fresh one.
        if let Some(value) = cookie.as_deref() {
            self.sessions.clear(Some(value));
            self.user_infos.invalidate(value).await;
        }

        match self.sessions.create(None, record) {
            Ok(directive) => {
                info!("Login completed");
                self.redirect(&self.config.redirect_after_login, &[directive])
            }
            Err(e) => e.into_response(),
        }
    }

    /// `GET {base}/logout`: revoke (best effort), clear, redirect.
    ///
    /// Waits for an in-flight refresh of the same session so the refreshed
    /// tokens are the ones revoked.
    pub async fn logout(&self, request: &Parts) -> Response {
        let cookie = self.config.cookie.read(&request.headers);
        let _lock = match cookie.as_deref() {
            Some(value) => Some(self.locks.lock(value).await),
            None => None,
        };

        if let Some(value) = cookie.as_deref() {
            self.user_infos.invalidate(value).await;
            if let Some(record) = self.sessions.read(value)
                && let Some(access_token) = record.session.access_token()
            {
                self.revoke(access_token).await;
            }
        }

        let cleared: Vec<_> = self.sessions.clear(cookie.as_deref()).into_iter().collect();
        self.redirect(&self.config.redirect_after_logout, &cleared)
    }

    /// Any other route: resolve the session to user info or turn the
    /// caller away.
    pub async fn protect(&self, request: &Parts) -> Authentication {
        let Some(cookie) = self.config.cookie.read(&request.headers) else {
            return self.unauthenticated(request, &[]);
        };

        match self.resolve(&cookie, request).await {
            Resolution::User(user, directives) => {
                let mut headers = HeaderMap::new();
                self.config.cookie.apply(&mut headers, &directives);
                Authentication::Granted { user, headers }
            }
            Resolution::Pending => self.unauthenticated(request, &[]),
            Resolution::Anonymous => {
                let cleared: Vec<_> = self.sessions.clear(Some(&cookie)).into_iter().collect();
                self.user_infos.invalidate(&cookie).await;
                self.unauthenticated(request, &cleared)
            }
            Resolution::Ended(cleared) => self.unauthenticated(request, &cleared),
        }
    }

    /// Stop the session store's and the user info cache's background work.
    pub fn shutdown(&self) {
        self.sessions.shutdown();
        self.user_infos.shutdown();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Login internals
    // ─────────────────────────────────────────────────────────────────────

    async fn complete_login(
        &self,
        request: &Parts,
        pending: Option<SessionRecord>,
    ) -> Result<SessionRecord> {
        let params = query_params(request);

        if let Some(description) = params.get("error_description") {
            return Err(AuthError::TokenExchange(format!(
                "provider reported: {description}"
            )));
        }
        if let Some(error) = params.get("error") {
            return Err(AuthError::TokenExchange(format!("provider reported: {error}")));
        }

        let Some(pending) = pending else {
            return Err(AuthError::Replay("no pending login".into()));
        };
        let Session::PendingLogin {
            state,
            nonce,
            code_verifier,
        } = pending.session
        else {
            return Err(AuthError::Replay("session is not a pending login".into()));
        };

        let code = params
            .get("code")
            .ok_or_else(|| AuthError::TokenExchange("callback has no code".into()))?;
        let returned_state = params
            .get("state")
            .ok_or_else(|| AuthError::Replay("callback has no state".into()))?;
        verify_state(&state, returned_state)?;

        let provider = self.directory.config().await?;
        let tokens = self
            .tokens
            .exchange_code(
                &provider.token_endpoint,
                code,
                &code_verifier,
                &self.redirect_uri(request),
                self.config.validate_id_token,
            )
            .await?;

        let max_age = tokens
            .expires_in
            .unwrap_or(self.config.session_max_age.as_secs() as i64);

        let created_at = match (self.config.validate_id_token, tokens.id_token.as_deref()) {
            (true, Some(id_token)) => {
                let claims = self.id_tokens.validate(id_token, &nonce)?;
                debug!(subject = ?claims.subject, "ID token validated");
                claims
                    .issued_at()
                    .ok_or_else(|| AuthError::InvalidIdToken("iat out of range".into()))?
            }
            (true, None) => return Err(AuthError::TokenExchange("response has no id_token".into())),
            (false, _) => Utc::now(),
        };

        Ok(SessionRecord::new(
            authenticated(tokens, None),
            max_age,
            created_at,
        ))
    }

    fn authorization_url(
        &self,
        provider: &ProviderConfig,
        pkce: &PkceChallenge,
        request: &Parts,
    ) -> Result<String> {
        let mut url = url::Url::parse(&provider.authorization_endpoint).map_err(|e| {
            AuthError::Discovery(format!("invalid authorization_endpoint: {e}"))
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", CHALLENGE_METHOD)
            .append_pair("nonce", &pkce.nonce)
            .append_pair("redirect_uri", &self.redirect_uri(request))
            .append_pair("response_mode", "query")
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &pkce.state);

        Ok(url.into())
    }

    /// Configured redirect URI, or the request origin plus the frontend
    /// callback route.
    fn redirect_uri(&self, request: &Parts) -> String {
        match &self.config.redirect_uri {
            Some(uri) => uri.clone(),
            None => format!(
                "{}{}",
                request_origin(request),
                self.config.frontend_route("callback")
            ),
        }
    }

    async fn revoke(&self, access_token: &str) {
        let provider = match self.directory.config().await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "Skipping token revocation");
                return;
            }
        };
        let Some(endpoint) = provider.revocation_endpoint.as_deref() else {
            debug!("Provider has no revocation endpoint");
            return;
        };
        if let Err(e) = self.tokens.revoke(endpoint, access_token).await {
            warn!(error = %e, "Token revocation failed");
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Protect internals
    // ─────────────────────────────────────────────────────────────────────

    async fn resolve(&self, cookie: &str, request: &Parts) -> Resolution {
        let Some(record) = self.sessions.read(cookie) else {
            return Resolution::Anonymous;
        };
        let Session::Authenticated {
            token_type,
            access_token,
            refresh_token,
            user_info,
        } = record.session
        else {
            return Resolution::Pending;
        };

        if let Some(user) = self.user_infos.get(cookie).await {
            return Resolution::User(user, Vec::new());
        }
        if let Some(user) = user_info {
            self.user_infos.insert(cookie, user.clone()).await;
            return Resolution::User(user, Vec::new());
        }

        let provider = match self.directory.config().await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(error = %e, "Cannot resolve user info");
                return Resolution::Anonymous;
            }
        };

        match self
            .tokens
            .user_info(&provider.userinfo_endpoint, &token_type, &access_token)
            .await
        {
            Ok(user) => {
                self.user_infos.insert(cookie, user.clone()).await;
                Resolution::User(user, Vec::new())
            }
            Err(AuthError::Unauthorized)
                if self.config.use_refresh_tokens && refresh_token.is_some() =>
            {
                let _lock = self.locks.lock(cookie).await;
                match self.recover(cookie, &access_token, &provider, request).await {
                    Resolution::Anonymous => Resolution::Ended(self.end(cookie).await),
                    resolution => resolution,
                }
            }
            Err(e) => {
                debug!(error = %e, "User info unavailable");
                Resolution::Anonymous
            }
        }
    }

    /// Handle a rejected access token. Caller holds the session's lock.
    ///
    /// Requests queued behind another refresh of the same session pick up
    /// its result instead of spending the refresh token again.
    async fn recover(
        &self,
        cookie: &str,
        rejected: &str,
        provider: &ProviderConfig,
        request: &Parts,
    ) -> Resolution {
        if let Some(user) = self.user_infos.get(cookie).await {
            return Resolution::User(user, Vec::new());
        }

        let Some(record) = self.sessions.read(cookie) else {
            debug!("Session ended while waiting for refresh");
            return Resolution::Anonymous;
        };
        let Session::Authenticated {
            token_type,
            access_token,
            refresh_token,
            ..
        } = record.session
        else {
            return Resolution::Pending;
        };

        if access_token != rejected {
            match self
                .tokens
                .user_info(&provider.userinfo_endpoint, &token_type, &access_token)
                .await
            {
                Ok(user) => {
                    self.user_infos.insert(cookie, user.clone()).await;
                    return Resolution::User(user, Vec::new());
                }
                Err(AuthError::Unauthorized) => {}
                Err(e) => {
                    debug!(error = %e, "User info unavailable");
                    return Resolution::Anonymous;
                }
            }
        }

        match refresh_token {
            Some(refresh_token) => self.refresh(cookie, &refresh_token, provider, request).await,
            None => Resolution::Anonymous,
        }
    }

    /// Clear a session whose tokens are no longer usable.
    async fn end(&self, cookie: &str) -> Vec<CookieDirective> {
        self.user_infos.invalidate(cookie).await;
        self.sessions.clear(Some(cookie)).into_iter().collect()
    }

    /// Refresh the access token once, fetch user info with the new token
    /// and re-issue the session.
    async fn refresh(
        &self,
        cookie: &str,
        refresh_token: &str,
        provider: &ProviderConfig,
        request: &Parts,
    ) -> Resolution {
        let tokens = match self
            .tokens
            .refresh(&provider.token_endpoint, refresh_token, &self.redirect_uri(request))
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                debug!(error = %e, "Token refresh failed");
                return Resolution::Anonymous;
            }
        };

        let user = match self
            .tokens
            .user_info(&provider.userinfo_endpoint, &tokens.token_type, &tokens.access_token)
            .await
        {
            Ok(user) => user,
            Err(e) => {
                debug!(error = %e, "User info rejected after refresh");
                return Resolution::Anonymous;
            }
        };

        // A login may have replaced the session while the provider answered.
        match self.sessions.read(cookie).map(|record| record.session) {
            Some(Session::Authenticated {
                refresh_token: Some(current),
                ..
            }) if current == refresh_token => {}
            Some(Session::PendingLogin { .. }) => return Resolution::Pending,
            _ => return Resolution::Anonymous,
        }

        let max_age = tokens
            .expires_in
            .unwrap_or(self.config.session_max_age.as_secs() as i64);
        // Cookie-held sessions keep only tokens; user info lives in the cache.
        let stored_user = (!self.sessions.is_client_side()).then(|| user.clone());
        let now = Utc::now();
        let record = SessionRecord::new(authenticated(tokens, stored_user), max_age, now);

        let directive = match self.sessions.create_at(Some(cookie), record, now) {
            Ok(directive) => directive,
            Err(e) => {
                warn!(error = %e, "Cannot store refreshed session");
                return Resolution::Anonymous;
            }
        };

        // Requests still carrying the old cookie value find the result here.
        self.user_infos.insert(cookie, user.clone()).await;
        if let Some(value) = directive.value.as_deref().filter(|value| *value != cookie) {
            self.user_infos.insert(value, user.clone()).await;
        }
        debug!("Access token refreshed");
        Resolution::User(user, vec![directive])
    }

    fn unauthenticated(&self, request: &Parts, cookies: &[CookieDirective]) -> Authentication {
        let login_url = self.config.frontend_route("login");

        let wants_html = request
            .headers
            .get(ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/html"));

        if wants_html {
            return Authentication::Respond(self.redirect(&login_url, cookies));
        }

        let mut response = self.text(StatusCode::UNAUTHORIZED, AUTHORIZATION_NEEDED, cookies);
        if let Ok(value) = HeaderValue::from_str(&login_url) {
            response.headers_mut().insert(FRONTEND_URL_HEADER, value);
        }
        Authentication::Respond(response)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Responses
    // ─────────────────────────────────────────────────────────────────────

    fn redirect(&self, location: &str, cookies: &[CookieDirective]) -> Response {
        let mut response = StatusCode::FOUND.into_response();
        match HeaderValue::from_str(location) {
            Ok(value) => {
                response.headers_mut().insert(LOCATION, value);
            }
            Err(e) => {
                warn!(error = %e, "Unusable redirect location");
                return AuthError::Config(format!("invalid redirect location: {location}"))
                    .into_response();
            }
        }
        self.config.cookie.apply(response.headers_mut(), cookies);
        response
    }

    fn text(&self, status: StatusCode, body: &'static str, cookies: &[CookieDirective]) -> Response {
        let mut response = (status, body).into_response();
        self.config.cookie.apply(response.headers_mut(), cookies);
        response
    }
}

#[async_trait]
impl Authenticator for OidcAuthenticator {
    async fn authenticate(&self, request: &Parts) -> Authentication {
        let path = request.uri.path();
        let route = if path == self.config.route("login") {
            Route::Login
        } else if path == self.config.route("callback") {
            Route::Callback
        } else if path == self.config.route("logout") {
            Route::Logout
        } else {
            return self.protect(request).await;
        };

        if request.method != Method::GET {
            let mut response = StatusCode::METHOD_NOT_ALLOWED.into_response();
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET"));
            return Authentication::Respond(response);
        }

        Authentication::Respond(match route {
            Route::Login => self.login(request).await,
            Route::Callback => self.callback(request).await,
            Route::Logout => self.logout(request).await,
        })
    }

    fn shutdown(&self) {
        OidcAuthenticator::shutdown(self);
    }
}

enum Route {
    Login,
    Callback,
    Logout,
}

fn authenticated(tokens: TokenResponse, user_info: Option<UserInfo>) -> Session {
    Session::Authenticated {
        token_type: tokens.token_type,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        user_info,
    }
}

fn query_params(request: &Parts) -> HashMap<String, String> {
    request
        .uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

/// Scheme and host the client used, honouring reverse-proxy headers.
fn request_origin(request: &Parts) -> String {
    let header = |name: &str| {
        request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let scheme = header("x-forwarded-proto")
        .or_else(|| request.uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    let host = header("x-forwarded-host")
        .or_else(|| header(HOST.as_str()))
        .or_else(|| request.uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    format!("{scheme}://{host}")
}
