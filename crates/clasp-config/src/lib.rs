//! Clasp Configuration System
//!
//! Locates the foreign library that clasp bindings talk to and lists the
//! optional capabilities a project depends on:
//! - Project configuration (clasp.toml)
//! - Global user configuration (~/.clasp/config.toml)
//! - Configuration precedence and merging
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.clasp/config.toml)
//! 2. Project config (./clasp.toml)
//! 3. Environment variables (CLASP_*)
//! 4. Explicit caller arguments
//!
//! # Example
//!
//! ```no_run
//! use clasp_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("binding against {}", config.library_name());
//! ```

pub mod global;
pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Library used when neither project nor global config names one
pub const DEFAULT_LIBRARY: &str = "OpenCL";

pub use global::GlobalConfig;
pub use loader::{Config, ConfigLoader};
pub use project::ProjectConfig;
