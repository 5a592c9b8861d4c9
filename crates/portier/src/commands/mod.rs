//! CLI command handlers.

use std::path::Path;

use anyhow::Result;
use portier_config::{ConfigPaths, LoadedConfig};

pub mod discover;
pub mod gen_cookie_key;
pub mod serve;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}

/// Load an explicit config file, or discover and merge the default layers.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    match path {
        Some(path) => Ok(LoadedConfig::from_file(path)?),
        None => Ok(ConfigPaths::discover().load()),
    }
}
