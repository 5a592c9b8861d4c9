//! Session cookie directives and rendering.

use axum::http::header::{HeaderMap, HeaderValue, SET_COOKIE};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Default session cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "authentication";

/// Instruction to set or delete the session cookie.
///
/// Produced by session stores; rendered with the configured
/// [`CookieOptions`]. A directive without a value deletes the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieDirective {
    pub value: Option<String>,
    pub max_age: Option<i64>,
}

impl CookieDirective {
    pub fn set(value: impl Into<String>, max_age: i64) -> Self {
        Self {
            value: Some(value.into()),
            max_age: Some(max_age),
        }
    }

    pub fn delete() -> Self {
        Self {
            value: None,
            max_age: Some(0),
        }
    }

    /// Build the cookie using the configured attributes.
    pub fn to_cookie(&self, options: &CookieOptions) -> Cookie<'static> {
        let value = self.value.clone().unwrap_or_default();
        let mut builder = Cookie::build((options.name.clone(), value))
            .path(options.path.clone())
            .http_only(options.http_only)
            .secure(options.secure)
            .same_site(options.same_site);

        if let Some(domain) = &options.domain {
            builder = builder.domain(domain.clone());
        }
        if let Some(max_age) = self.max_age {
            builder = builder.max_age(time::Duration::seconds(max_age));
        }

        builder.build()
    }
}

/// Attributes applied to every session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// Read this cookie's value from request headers.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        CookieJar::from_headers(headers)
            .get(&self.name)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Append `Set-Cookie` headers for each directive.
    pub fn apply(&self, headers: &mut HeaderMap, directives: &[CookieDirective]) {
        for directive in directives {
            let cookie = directive.to_cookie(self);
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(e) => warn!(error = %e, "Dropping unrenderable session cookie"),
            }
        }
    }
}

/// Cookie lifetime left for a record created at `created_at`.
///
/// Elapsed time is rounded up to whole seconds and the result never drops
/// below one second, so a freshly issued cookie is always accepted by the
/// browser.
pub fn remaining_max_age(max_age: i64, created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_ms = (now - created_at).num_milliseconds().max(0);
    let elapsed = (elapsed_ms + 999) / 1000;
    (max_age - elapsed).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::COOKIE;
    use chrono::Duration;

    #[test]
    fn test_remaining_max_age_slides() {
        let now = Utc::now();
        assert_eq!(remaining_max_age(3600, now, now), 3600);
        assert_eq!(
            remaining_max_age(3600, now - Duration::seconds(600), now),
            3000
        );
        assert_eq!(
            remaining_max_age(3600, now - Duration::milliseconds(1500), now),
            3598
        );
    }

    #[test]
    fn test_remaining_max_age_floor() {
        let now = Utc::now();
        assert_eq!(
            remaining_max_age(60, now - Duration::seconds(600), now),
            1
        );
    }

    #[test]
    fn test_render_set_cookie() {
        let options = CookieOptions::default().with_domain("example.com");
        let cookie = CookieDirective::set("abc", 120).to_cookie(&options);
        let rendered = cookie.to_string();

        assert!(rendered.starts_with("authentication=abc"));
        assert!(rendered.contains("Max-Age=120"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Domain=example.com"));
        assert!(rendered.contains("Path=/"));
    }

    #[test]
    fn test_render_deletion() {
        let options = CookieOptions::default();
        let mut headers = HeaderMap::new();
        options.apply(&mut headers, &[CookieDirective::delete()]);

        let value = headers.get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(value.starts_with("authentication=;"));
        assert!(value.contains("Max-Age=0"));
    }

    #[test]
    fn test_read_cookie() {
        let options = CookieOptions::default();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("other=1; authentication=session-id"),
        );

        assert_eq!(options.read(&headers).as_deref(), Some("session-id"));
        assert_eq!(options.with_name("missing").read(&headers), None);
    }
}
