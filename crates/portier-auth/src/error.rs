//! Error types for the authentication engine.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors raised while authenticating a request.
///
/// An expired or unknown session is not an error; stores report it as
/// absence.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Discovery document could not be fetched or parsed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Provider does not advertise a capability this engine needs.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// State or nonce mismatch, or a callback without a pending login.
    #[error("Replay detected: {0}")]
    Replay(String),

    /// ID token failed structural or claim validation.
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    /// Token endpoint rejected the grant or returned an unusable response.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// Userinfo endpoint rejected the access token (HTTP 401).
    #[error("Access token rejected")]
    Unauthorized,

    /// Userinfo endpoint failed for any other reason.
    #[error("User info error: {0}")]
    UserInfo(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Session cookie could not be sealed or opened.
    #[error("Cookie error: {0}")]
    Cookie(String),
}

impl AuthError {
    /// HTTP status used when this error ends a request.
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Discovery(_) | AuthError::UnsupportedProvider(_) | AuthError::Network(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::Replay(_)
            | AuthError::InvalidIdToken(_)
            | AuthError::TokenExchange(_) => StatusCode::FORBIDDEN,
            AuthError::Unauthorized | AuthError::UserInfo(_) => StatusCode::UNAUTHORIZED,
            AuthError::Config(_) | AuthError::Cookie(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Network(e.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AuthError::Replay("state".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::UnsupportedProvider("no S256".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AuthError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_into_response_status() {
        let response = AuthError::InvalidIdToken("aud".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
