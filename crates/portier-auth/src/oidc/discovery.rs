//! Provider discovery and capability checks.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AuthError, Result};

/// Path of the discovery document relative to the provider URL.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The subset of the discovery document this engine uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub issuer: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    #[serde(default)]
    pub revocation_endpoint: Option<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub response_modes_supported: Option<Vec<String>>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,
}

impl ProviderConfig {
    /// Check that the provider can run Authorization Code + PKCE with
    /// HTTP Basic client authentication.
    pub fn check_capabilities(&self, require_refresh: bool) -> Result<()> {
        require(
            &self.code_challenge_methods_supported,
            "S256",
            "code_challenge_methods_supported",
        )?;
        require(
            &self.grant_types_supported,
            "authorization_code",
            "grant_types_supported",
        )?;
        if require_refresh {
            require(
                &self.grant_types_supported,
                "refresh_token",
                "grant_types_supported",
            )?;
        }
        require(&self.response_types_supported, "code", "response_types_supported")?;

        // Optional in the document; only checked when advertised.
        if let Some(modes) = &self.response_modes_supported {
            require(modes, "query", "response_modes_supported")?;
        }
        if let Some(methods) = &self.token_endpoint_auth_methods_supported {
            require(
                methods,
                "client_secret_basic",
                "token_endpoint_auth_methods_supported",
            )?;
        }
        Ok(())
    }
}

fn require(values: &[String], wanted: &str, field: &str) -> Result<()> {
    if values.iter().any(|v| v == wanted) {
        Ok(())
    } else {
        Err(AuthError::UnsupportedProvider(format!(
            "{field} does not include {wanted}"
        )))
    }
}

/// Fetches the provider's discovery document once and memoizes it.
///
/// Concurrent first calls may each fetch; the last successful one wins.
/// Failed fetches and unsupported providers are not cached.
pub struct ProviderDirectory {
    http: reqwest::Client,
    provider_url: String,
    require_refresh: bool,
    cached: RwLock<Option<Arc<ProviderConfig>>>,
}

impl ProviderDirectory {
    pub fn new(http: reqwest::Client, provider_url: impl Into<String>, require_refresh: bool) -> Self {
        Self {
            http,
            provider_url: provider_url.into(),
            require_refresh,
            cached: RwLock::new(None),
        }
    }

    /// URL of the discovery document.
    pub fn discovery_url(&self) -> String {
        format!("{}{}", self.provider_url.trim_end_matches('/'), DISCOVERY_PATH)
    }

    /// Return the provider configuration, fetching it on first use.
    pub async fn config(&self) -> Result<Arc<ProviderConfig>> {
        let cached = self.cached.read().clone();
        if let Some(config) = cached {
            return Ok(config);
        }

        let config = Arc::new(self.fetch().await?);
        *self.cached.write() = Some(Arc::clone(&config));
        Ok(config)
    }

    /// Fetch and validate without touching the cache.
    pub async fn fetch(&self) -> Result<ProviderConfig> {
        let url = self.discovery_url();
        debug!(url = %url, "Fetching provider discovery document");

        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AuthError::Discovery(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Discovery(format!(
                "{url} returned {status}: {body}"
            )));
        }

        let config: ProviderConfig = response
            .json()
            .await
            .map_err(|e| AuthError::Discovery(format!("invalid discovery document: {e}")))?;

        config.check_capabilities(self.require_refresh)?;

        info!(
            issuer = config.issuer.as_deref().unwrap_or(&self.provider_url),
            "Provider configuration loaded"
        );
        Ok(config)
    }

    /// Forget the cached configuration; the next call re-discovers.
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    pub fn is_cached(&self) -> bool {
        self.cached.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn document(base: &str) -> serde_json::Value {
        json!({
            "issuer": base,
            "authorization_endpoint": format!("{base}/authorize"),
            "token_endpoint": format!("{base}/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "grant_types_supported": ["authorization_code", "refresh_token"],
            "response_types_supported": ["code"],
            "code_challenge_methods_supported": ["plain", "S256"],
        })
    }

    fn parse(value: serde_json::Value) -> ProviderConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_capabilities_accepted() {
        let config = parse(document("https://idp"));
        assert!(config.check_capabilities(true).is_ok());
    }

    #[test]
    fn test_missing_s256_rejected() {
        let mut doc = document("https://idp");
        doc["code_challenge_methods_supported"] = json!(["plain"]);
        assert!(matches!(
            parse(doc).check_capabilities(false),
            Err(AuthError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_missing_field_rejected() {
        let mut doc = document("https://idp");
        doc.as_object_mut().unwrap().remove("response_types_supported");
        assert!(parse(doc).check_capabilities(false).is_err());
    }

    #[test]
    fn test_refresh_grant_only_required_when_enabled() {
        let mut doc = document("https://idp");
        doc["grant_types_supported"] = json!(["authorization_code"]);
        let config = parse(doc);
        assert!(config.check_capabilities(false).is_ok());
        assert!(config.check_capabilities(true).is_err());
    }

    #[test]
    fn test_optional_lists_checked_when_present() {
        let mut doc = document("https://idp");
        doc["response_modes_supported"] = json!(["fragment"]);
        assert!(parse(doc).check_capabilities(false).is_err());

        let mut doc = document("https://idp");
        doc["token_endpoint_auth_methods_supported"] = json!(["private_key_jwt"]);
        assert!(parse(doc).check_capabilities(false).is_err());

        let mut doc = document("https://idp");
        doc["response_modes_supported"] = json!(["query", "fragment"]);
        doc["token_endpoint_auth_methods_supported"] = json!(["client_secret_basic"]);
        assert!(parse(doc).check_capabilities(false).is_ok());
    }

    #[tokio::test]
    async fn test_config_is_fetched_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .expect(1)
            .mount(&server)
            .await;

        let directory = ProviderDirectory::new(reqwest::Client::new(), server.uri(), true);
        let first = directory.config().await.unwrap();
        let second = directory.config().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.token_endpoint, format!("{}/token", server.uri()));
        assert!(directory.is_cached());
    }

    #[tokio::test]
    async fn test_http_failure_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let directory = ProviderDirectory::new(reqwest::Client::new(), server.uri(), false);
        assert!(matches!(
            directory.config().await,
            Err(AuthError::Discovery(_))
        ));
        assert!(!directory.is_cached());
    }

    #[tokio::test]
    async fn test_non_json_is_discovery_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let directory = ProviderDirectory::new(reqwest::Client::new(), server.uri(), false);
        assert!(matches!(
            directory.config().await,
            Err(AuthError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_provider_not_cached() {
        let server = MockServer::start().await;
        let mut doc = document(&server.uri());
        doc["code_challenge_methods_supported"] = json!(["plain"]);
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(doc))
            .mount(&server)
            .await;

        let directory = ProviderDirectory::new(reqwest::Client::new(), server.uri(), false);
        assert!(matches!(
            directory.config().await,
            Err(AuthError::UnsupportedProvider(_))
        ));
        assert!(!directory.is_cached());
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document(&server.uri())))
            .expect(2)
            .mount(&server)
            .await;

        let directory = ProviderDirectory::new(reqwest::Client::new(), server.uri(), false);
        directory.config().await.unwrap();
        directory.invalidate();
        directory.config().await.unwrap();
    }
}
