//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `yaml-config` *(default)*: `cosmic.yml` / `cosmic.yaml`
//! - `toml-config`: `cosmic.toml`
//!
//! # Search Order
//!
//! 1. An explicit file (`--config-file`); a missing file is an error
//! 2. `cosmic.yml`, `cosmic.yaml`, `cosmic.toml` in the current directory
//! 3. `.cosmic.yml`, `.cosmic.yaml`, `.cosmic.toml` in the home directory
//!
//! The first file found is loaded. When none is found an empty tree is used.
//!
//! # Layering (lowest to highest)
//!
//! 1. The configuration file
//! 2. Environment variables (`COSMIC_*`)
//! 3. Programmatic overrides
//!
//! Environment variables use `__` as the nesting separator:
//!
//! - `COSMIC_AUTH_TYPE=ldap` → `auth_type = "ldap"`
//! - `COSMIC_PLUGINS__JIRA__URL=https://jira` → `plugins.jira.url = "https://jira"`
//!
//! # Example
//!
//! ```rust,ignore
//! use cosmic_runtime::config::ConfigLoader;
//!
//! let tree = ConfigLoader::new()
//!     .file("./deploy/cosmic.yml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use cosmic_core::ConfigTree;
use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};

/// Prefix of environment variables merged into the configuration.
pub const ENV_PREFIX: &str = "COSMIC_";

/// File names searched in the current directory, in priority order.
pub fn project_file_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "yaml-config")]
    names.extend(["cosmic.yml", "cosmic.yaml"]);
    #[cfg(feature = "toml-config")]
    names.push("cosmic.toml");
    names
}

/// File names searched in the home directory, in priority order.
pub fn home_file_names() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "yaml-config")]
    names.extend([".cosmic.yml", ".cosmic.yaml"]);
    #[cfg(feature = "toml-config")]
    names.push(".cosmic.toml");
    names
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Specific config file to load (overrides search).
    config_file: Option<PathBuf>,
    /// Project directories searched before the home directory.
    search_paths: Vec<PathBuf>,
    /// Home directory; `None` means ask the platform.
    home_dir: Option<PathBuf>,
    /// Whether to search the home directory at all.
    search_home: bool,
    /// Whether to load environment variables.
    load_env: bool,
    /// Overrides merged last.
    overrides: Vec<Value>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader with the default search order.
    pub fn new() -> Self {
        Self {
            config_file: None,
            search_paths: Vec::new(),
            home_dir: None,
            search_home: true,
            load_env: true,
            overrides: Vec::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets an optional specific configuration file.
    pub fn maybe_file<P: AsRef<Path>>(self, path: Option<P>) -> Self {
        match path {
            Some(path) => self.file(path),
            None => self,
        }
    }

    /// Adds a project directory to search instead of the current directory.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Uses `path` as the home directory.
    pub fn home_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.home_dir = Some(path.as_ref().to_path_buf());
        self.search_home = true;
        self
    }

    /// Skips the home directory.
    pub fn without_home(mut self) -> Self {
        self.search_home = false;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges `value` on top of every other source.
    pub fn merge(mut self, value: Value) -> Self {
        self.overrides.push(value);
        self
    }

    /// Finds the configuration file that [`load`](Self::load) would read.
    pub fn locate(&self) -> ConfigResult<Option<PathBuf>> {
        if let Some(path) = &self.config_file {
            return if path.exists() {
                Ok(Some(path.clone()))
            } else {
                Err(ConfigError::FileNotFound(path.clone()))
            };
        }

        let project_dirs = if self.search_paths.is_empty() {
            std::env::current_dir().into_iter().collect()
        } else {
            self.search_paths.clone()
        };
        for dir in &project_dirs {
            for name in project_file_names() {
                let candidate = dir.join(name);
                trace!(path = %candidate.display(), "Probing for configuration file");
                if candidate.is_file() {
                    return Ok(Some(candidate));
                }
            }
        }

        if self.search_home
            && let Some(home) = self.home_dir.clone().or_else(dirs::home_dir)
        {
            for name in home_file_names() {
                let candidate = home.join(name);
                trace!(path = %candidate.display(), "Probing for configuration file");
                if candidate.is_file() {
                    return Ok(Some(candidate));
                }
            }
        }
        Ok(None)
    }

    /// Loads and normalises the configuration tree.
    pub fn load(self) -> ConfigResult<ConfigTree> {
        let figment = self.build_figment()?;
        let value: Value = figment.extract()?;
        let tree = ConfigTree::from_value(value);
        debug!(
            plugins = tree.plugin_names().len(),
            "Configuration loaded successfully"
        );
        Ok(tree)
    }

    /// Builds the figment instance with all sources.
    fn build_figment(self) -> ConfigResult<Figment> {
        let mut figment = Figment::new();

        match self.locate()? {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, &path)?;
            }
            None => warn!("No configuration file found, using an empty configuration"),
        }

        if self.load_env {
            trace!(prefix = ENV_PREFIX, "Loading environment variables");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        for value in self.overrides {
            figment = figment.merge(Serialized::defaults(value));
        }
        Ok(figment)
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    ///
    /// Only extensions enabled via feature flags are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<ConfigTree> {
    ConfigLoader::new().load()
}

/// Loads configuration from a specific file.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<ConfigTree> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================
