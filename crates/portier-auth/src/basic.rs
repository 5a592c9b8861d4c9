//! Static-credential HTTP Basic authentication.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{
    http::{
        StatusCode,
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::authenticator::{Authentication, Authenticator};
use crate::identity::UserInfo;
use crate::oidc::pkce::constant_time_eq;

/// Default realm announced in `WWW-Authenticate`.
pub const DEFAULT_REALM: &str = "portier";

/// Authenticates requests against a fixed user → password map.
pub struct BasicAuthenticator {
    users: HashMap<String, String>,
    realm: String,
}

impl BasicAuthenticator {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self {
            users,
            realm: DEFAULT_REALM.to_string(),
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    fn challenge(&self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", self.realm))],
            "Authorization needed",
        )
            .into_response()
    }

    fn check(&self, user_name: &str, password: &str) -> bool {
        // Compare against a dummy for unknown users so both paths do the
        // same amount of work.
        let (expected, known) = match self.users.get(user_name) {
            Some(expected) => (expected.as_str(), true),
            None => ("", false),
        };
        constant_time_eq(password, expected) && known
    }
}

fn invalid_parameters() -> Response {
    (StatusCode::BAD_REQUEST, "Invalid authorization parameters").into_response()
}

#[async_trait]
impl Authenticator for BasicAuthenticator {
    async fn authenticate(&self, request: &Parts) -> Authentication {
        let Some(header) = request.headers.get(AUTHORIZATION) else {
            return Authentication::Respond(self.challenge());
        };
        let Ok(header) = header.to_str() else {
            return Authentication::Respond(invalid_parameters());
        };
        let Some((scheme, parameters)) = header.split_once(' ') else {
            return Authentication::Respond(self.challenge());
        };
        if !scheme.eq_ignore_ascii_case("basic") {
            return Authentication::Respond(self.challenge());
        }

        let Some(decoded) = STANDARD
            .decode(parameters.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
        else {
            return Authentication::Respond(invalid_parameters());
        };

        let Some((user_name, password)) = decoded.split_once(':') else {
            return Authentication::Respond(invalid_parameters());
        };
        if user_name.is_empty() || password.is_empty() {
            return Authentication::Respond(invalid_parameters());
        }

        if !self.check(user_name, password) {
            debug!(user = %user_name, "Basic authentication rejected");
            return Authentication::Respond((StatusCode::FORBIDDEN, "No access").into_response());
        }

        Authentication::granted(UserInfo::from_user_name(user_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn authenticator() -> BasicAuthenticator {
        BasicAuthenticator::new(HashMap::from([(
            "alice".to_string(),
            "pa:ss".to_string(),
        )]))
    }

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    async fn status(authorization: Option<&str>) -> StatusCode {
        match authenticator().authenticate(&parts(authorization)).await {
            Authentication::Respond(response) => response.status(),
            Authentication::Granted { .. } => StatusCode::OK,
        }
    }

    #[tokio::test]
    async fn test_valid_credentials() {
        let header = basic("alice:pa:ss");
        match authenticator().authenticate(&parts(Some(&header))).await {
            Authentication::Granted { user, .. } => {
                assert_eq!(user, UserInfo::from_user_name("alice"));
            }
            Authentication::Respond(r) => panic!("unexpected response {}", r.status()),
        }
    }

    #[tokio::test]
    async fn test_missing_header_challenges() {
        let response = match authenticator().authenticate(&parts(None)).await {
            Authentication::Respond(response) => response,
            Authentication::Granted { .. } => panic!("granted without credentials"),
        };
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"portier\""
        );
        assert_eq!(status(Some("Bearer abc")).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_malformed_parameters() {
        assert_eq!(status(Some("Basic !!!")).await, StatusCode::BAD_REQUEST);
        assert_eq!(status(Some(&basic("alice"))).await, StatusCode::BAD_REQUEST);
        assert_eq!(status(Some(&basic(":pass"))).await, StatusCode::BAD_REQUEST);
        assert_eq!(status(Some(&basic("alice:"))).await, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrong_credentials() {
        assert_eq!(status(Some(&basic("alice:wrong"))).await, StatusCode::FORBIDDEN);
        assert_eq!(status(Some(&basic("bob:pa:ss"))).await, StatusCode::FORBIDDEN);
    }
}
