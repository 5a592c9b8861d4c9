//! OpenID Connect Authorization Code flow with PKCE.

pub mod config;
pub mod discovery;
pub mod engine;
pub mod id_token;
pub mod pkce;
pub mod token;

pub use config::{OidcConfig, SessionStoreKind};
pub use discovery::{ProviderConfig, ProviderDirectory};
pub use engine::{FRONTEND_URL_HEADER, OidcAuthenticator};
pub use id_token::{IdTokenClaims, IdTokenValidator};
pub use pkce::PkceChallenge;
pub use token::{TokenExchanger, TokenResponse};
