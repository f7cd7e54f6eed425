//! Project Configuration (clasp.toml)
//!
//! Handles project-level configuration stored in `clasp.toml` at the project root.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project configuration from clasp.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Which foreign library to bind against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<LibraryConfig>,

    /// Optional capabilities the project relies on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ExtensionsConfig>,
}

/// Foreign library location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct LibraryConfig {
    /// Short name ("OpenCL") or absolute path to the shared library
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Directories searched before the platform defaults
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

/// Capabilities that must resolve when the library is opened
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ExtensionsConfig {
    #[serde(default)]
    pub required: Vec<String>,
}

impl ProjectConfig {
    /// Load project configuration from a file
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

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(library) = &self.library {
            validate_library("library", library)?;
        }

        if let Some(extensions) = &self.extensions {
            for name in &extensions.required {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: "extensions.required".to_string(),
                        reason: "capability name cannot be empty".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Get the library name, if present
    pub fn library_name(&self) -> Option<&str> {
        self.library.as_ref().and_then(|l| l.name.as_deref())
    }

    /// Get the project search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.library
            .as_ref()
            .map(|l| l.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Get the required capability names
    pub fn required_extensions(&self) -> &[String] {
        self.extensions
            .as_ref()
            .map(|e| e.required.as_slice())
            .unwrap_or(&[])
    }
}

/// Shared by the project and global configs
pub(crate) fn validate_library(section: &str, library: &LibraryConfig) -> ConfigResult<()> {
    if let Some(name) = &library.name {
        if name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.name", section),
                reason: "name cannot be empty".to_string(),
            });
        }
    }

    for path in &library.search_paths {
        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("{}.search-paths", section),
                reason: "search path cannot be empty".to_string(),
            });
        }
    }

    Ok(())
}
