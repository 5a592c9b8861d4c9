//! Configuration system for the Portier authentication gateway.
//!
//! Provides TOML-based configuration with:
//! - Mechanism selection (`[authentication] mechanism = "oidc" | "basic"`)
//! - OIDC provider, route, cookie, session store and cache settings
//! - Config file layering (user config + project-local overrides)
//! - Secret resolution (env var → config file)

pub mod error;
pub mod layers;
pub mod secrets;
pub mod types;

pub use error::{ConfigError, Result};
pub use layers::{ConfigPaths, Layer, LayerFile, LoadedConfig};
pub use secrets::{
    CLIENT_SECRET_ENV, COOKIE_KEY_ENV, ResolvedSecret, SecretSource, resolve_client_secret,
    resolve_cookie_key, resolve_secret,
};
pub use types::*;
