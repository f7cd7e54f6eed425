//! Global Configuration (~/.clasp/config.toml)
//!
//! Handles user-level configuration stored in `~/.clasp/config.toml`.

use crate::project::{validate_library, LibraryConfig};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global user configuration from ~/.clasp/config.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    /// Machine-wide library defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<LibraryConfig>,
}

impl GlobalConfig {
    /// Load global configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the global configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(defaults) = &self.defaults {
            validate_library("defaults", defaults)?;
        }
        Ok(())
    }

    /// Get the global config file path (~/.clasp/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".clasp").join("config.toml"))
    }

    /// Get the default library name
    pub fn default_library(&self) -> Option<&str> {
        self.defaults.as_ref().and_then(|d| d.name.as_deref())
    }

    /// Get the machine-wide search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.defaults
            .as_ref()
            .map(|d| d.search_paths.as_slice())
            .unwrap_or(&[])
    }
}
