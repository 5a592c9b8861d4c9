//! Authentication capability and the axum middleware that mounts it.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::identity::UserInfo;

// ─────────────────────────────────────────────────────────────────────────────
// Capability
// ─────────────────────────────────────────────────────────────────────────────

/// Result of authenticating one request.
#[derive(Debug)]
pub enum Authentication {
    /// Let the request through with this identity. `headers` are appended
    /// to the eventual response (refreshed session cookies).
    Granted { user: UserInfo, headers: HeaderMap },
    /// Answer the request directly: a redirect, a rejection, or one of the
    /// login/callback/logout routes.
    Respond(Response),
}

impl Authentication {
    pub fn granted(user: UserInfo) -> Self {
        Authentication::Granted {
            user,
            headers: HeaderMap::new(),
        }
    }
}

/// Something that turns a request into an identity or a response.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &Parts) -> Authentication;

    /// Stop background work owned by the authenticator.
    fn shutdown(&self) {}
}

/// Shared authenticator handle, used as middleware state.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

// ─────────────────────────────────────────────────────────────────────────────
// Middleware
// ─────────────────────────────────────────────────────────────────────────────

/// Axum middleware running an [`Authenticator`] in front of a router.
///
/// On success the [`UserInfo`] is inserted into the request extensions:
///
/// ```ignore
/// let auth: SharedAuthenticator = Arc::new(OidcAuthenticator::new(config)?);
/// let app = Router::new()
///     .route("/whoami", get(|Extension(user): Extension<UserInfo>| async move { Json(user) }))
///     .layer(middleware::from_fn_with_state(auth, authenticate));
/// ```
pub async fn authenticate(
    State(authenticator): State<SharedAuthenticator>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    match authenticator.authenticate(&parts).await {
        Authentication::Respond(response) => response,
        Authentication::Granted { user, headers } => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(user);

            let mut response = next.run(request).await;
            for (name, value) in headers.iter() {
                response.headers_mut().append(name.clone(), value.clone());
            }
            response
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Extension, Router,
        body::Body,
        http::{HeaderValue, StatusCode, header::SET_COOKIE},
        middleware,
        response::IntoResponse,
        routing::get,
    };
    use tower::ServiceExt;

    struct HeaderGate;

    #[async_trait]
    impl Authenticator for HeaderGate {
        async fn authenticate(&self, request: &Parts) -> Authentication {
            match request.headers.get("x-user").and_then(|v| v.to_str().ok()) {
                Some(name) => {
                    let mut headers = HeaderMap::new();
                    headers.append(SET_COOKIE, HeaderValue::from_static("gate=1"));
                    Authentication::Granted {
                        user: UserInfo::from_user_name(name),
                        headers,
                    }
                }
                None => Authentication::Respond(StatusCode::UNAUTHORIZED.into_response()),
            }
        }
    }

    fn app() -> Router {
        let auth: SharedAuthenticator = Arc::new(HeaderGate);
        Router::new()
            .route(
                "/",
                get(|Extension(user): Extension<UserInfo>| async move {
                    let mut response = user.display_name().unwrap_or_default().to_string().into_response();
                    response
                        .headers_mut()
                        .append(SET_COOKIE, HeaderValue::from_static("app=1"));
                    response
                }),
            )
            .layer(middleware::from_fn_with_state(auth, authenticate))
    }

    #[tokio::test]
    async fn test_granted_request_reaches_handler() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-user", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookies: Vec<_> = response.headers().get_all(SET_COOKIE).iter().collect();
        assert_eq!(cookies.len(), 2);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"alice");
    }

    #[tokio::test]
    async fn test_respond_short_circuits() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
