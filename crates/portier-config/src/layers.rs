//! The two config files and how they stack.
//!
//! `<user config dir>/config.toml` is read first and `./portier.toml` is
//! merged over it. A file named with `--config` replaces both.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::{ConfigError, PortierConfig, Result};

pub const PROJECT_FILE: &str = "portier.toml";
pub const USER_FILE: &str = "config.toml";

/// Overrides the user config directory (default `~/.config/portier`).
pub const CONFIG_DIR_ENV: &str = "PORTIER_CONFIG_DIR";

/// Which file a setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
    /// Given on the command line.
    Explicit,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::User => "user",
            Layer::Project => "project",
            Layer::Explicit => "explicit",
        })
    }
}

/// A config file that contributed to the merged result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerFile {
    pub layer: Layer,
    pub path: PathBuf,
}

/// Merged configuration plus what the operator should hear about it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: PortierConfig,
    /// Files actually read, lowest precedence first.
    pub files: Vec<LayerFile>,
    /// Skipped files and secrets kept in plaintext.
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Load exactly one file. Unlike the discovered layers, a missing or
    /// broken file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = read(path)?;
        let warnings = plaintext_warnings(&config);
        Ok(Self {
            config,
            files: vec![LayerFile {
                layer: Layer::Explicit,
                path: path.to_path_buf(),
            }],
            warnings,
        })
    }
}

/// Locations of the user and project files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// `None` when no config directory can be determined.
    pub user: Option<PathBuf>,
    pub project: PathBuf,
}

impl ConfigPaths {
    /// User file from [`CONFIG_DIR_ENV`] or the platform config dir,
    /// project file from the working directory.
    pub fn discover() -> Self {
        let user_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
            _ => dirs::config_dir().map(|dir| dir.join("portier")),
        };
        Self {
            user: user_dir.map(|dir| dir.join(USER_FILE)),
            project: PathBuf::from(PROJECT_FILE),
        }
    }

    pub fn in_dirs(user_dir: &Path, project_dir: &Path) -> Self {
        Self {
            user: Some(user_dir.join(USER_FILE)),
            project: project_dir.join(PROJECT_FILE),
        }
    }

    /// Merge whichever files exist. Unreadable or malformed files are
    /// skipped with a warning so a stray file cannot stop the gateway.
    pub fn load(&self) -> LoadedConfig {
        let mut loaded = LoadedConfig {
            config: PortierConfig::new(),
            files: Vec::new(),
            warnings: Vec::new(),
        };

        let layers = self
            .user
            .iter()
            .map(|path| (Layer::User, path))
            .chain([(Layer::Project, &self.project)]);
        for (layer, path) in layers {
            if !path.is_file() {
                continue;
            }
            match read(path) {
                Ok(config) => {
                    loaded.config.merge(config);
                    loaded.files.push(LayerFile {
                        layer,
                        path: path.clone(),
                    });
                }
                Err(e) => loaded
                    .warnings
                    .push(format!("Ignoring {} config {}: {}", layer, path.display(), e)),
            }
        }

        loaded.warnings.extend(plaintext_warnings(&loaded.config));
        loaded
    }
}

/// Read and parse one file.
pub fn read(path: &Path) -> Result<PortierConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    PortierConfig::from_toml(&contents)
}

fn plaintext_warnings(config: &PortierConfig) -> Vec<String> {
    config
        .oidc
        .iter()
        .flat_map(|oidc| oidc.plaintext_secrets())
        .map(|field| format!("[oidc] {field} is stored in plaintext; prefer the environment"))
        .collect()
}
