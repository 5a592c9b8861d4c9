//! Authentication middleware engine for axum services.
//!
//! Turns an incoming request into either an authenticated identity
//! ([`UserInfo`]) or a response that redirects or rejects the caller.
//!
//! # Components
//!
//! - [`authenticator`]: the [`Authenticator`] capability and the axum middleware
//! - [`basic`]: static-credential HTTP Basic authentication
//! - [`oidc`]: OpenID Connect Authorization Code + PKCE (discovery, token
//!   exchange, ID token validation, refresh, logout)
//! - [`session`]: pending/authenticated sessions, in memory or sealed in the cookie
//! - [`user_info_cache`]: bounded per-session user info cache
//! - [`cookie`]: cookie directives and attributes

pub mod authenticator;
pub mod basic;
pub mod cookie;
pub mod error;
pub mod identity;
pub mod oidc;
pub mod session;
pub mod user_info_cache;

pub use authenticator::{Authentication, Authenticator, SharedAuthenticator, authenticate};
pub use basic::BasicAuthenticator;
pub use cookie::{CookieDirective, CookieOptions};
pub use error::{AuthError, Result};
pub use identity::UserInfo;
pub use oidc::{OidcAuthenticator, OidcConfig, ProviderConfig, SessionStoreKind};
pub use session::{
    CookieKey, CookieSessionStore, MemorySessionStore, Session, SessionRecord, SessionStore,
    SharedSessionStore,
};
pub use user_info_cache::UserInfoCache;

/// Re-exported so callers can configure cookies without a direct dependency.
pub use axum_extra::extract::cookie::SameSite;
