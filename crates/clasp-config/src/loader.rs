//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::global::GlobalConfig;
use crate::project::{LibraryConfig, ProjectConfig};
use crate::{ConfigError, ConfigResult, DEFAULT_LIBRARY};
use std::env;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const PROJECT_FILE: &str = "clasp.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.clasp/config.toml) - lowest priority
/// 2. Project config (./clasp.toml) - overrides global
/// 3. Environment variables (CLASP_*) - overrides project
/// 4. Explicit caller arguments - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Global configuration
    pub global: GlobalConfig,

    /// Project root directory (where clasp.toml was found)
    pub project_root: Option<PathBuf>,

    /// Directory holding the loaded global config file
    pub global_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Use an explicit global config file instead of ~/.clasp/config.toml
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find clasp.toml, then loads and merges
    /// global config if it exists.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_config) = self.find_project_config(start_dir)?;
        let (global_config, global_root) = self.load_global_or_default()?;
        let project_config = self.apply_env_overrides(project_config)?;

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
            global_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_config = ProjectConfig::load_from_file(config_path)?;
        let (global_config, global_root) = self.load_global_or_default()?;
        let project_config = self.apply_env_overrides(project_config)?;

        let project_root = config_path.parent().map(|p| p.to_path_buf());

        Ok(Config {
            project: project_config,
            global: global_config,
            project_root,
            global_root,
        })
    }

    /// Find project configuration by walking up directory tree
    ///
    /// Returns (project_root, project_config) or error if the file is malformed
    fn find_project_config(
        &self,
        start_dir: &Path,
    ) -> ConfigResult<(Option<PathBuf>, ProjectConfig)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_FILE);

            if config_path.exists() {
                let project_config = ProjectConfig::load_from_file(&config_path)?;
                return Ok((Some(current), project_config));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, ProjectConfig::default())),
            }
        }
    }

    /// Global config plus its directory, or the default when there is no home directory
    fn load_global_or_default(&mut self) -> ConfigResult<(GlobalConfig, Option<PathBuf>)> {
        match self.load_global_config() {
            Err(ConfigError::HomeNotFound) => Ok((GlobalConfig::default(), None)),
            other => other,
        }
    }

    /// Load global configuration from ~/.clasp/config.toml
    ///
    /// Also returns the directory of the file when one was read.
    fn load_global_config(&mut self) -> ConfigResult<(GlobalConfig, Option<PathBuf>)> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = GlobalConfig::global_config_path()?;
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional - if it doesn't exist, return default
        if !path.exists() {
            return Ok((GlobalConfig::default(), None));
        }

        let global = GlobalConfig::load_from_file(&path)?;
        Ok((global, path.parent().map(Path::to_path_buf)))
    }

    /// Apply environment variable overrides to project config
    ///
    /// - CLASP_LIBRARY replaces the library name
    /// - CLASP_SEARCH_PATH (platform path list) is searched before configured paths
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(name) = env::var("CLASP_LIBRARY") {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "CLASP_LIBRARY".to_string(),
                    reason: "name cannot be empty".to_string(),
                });
            }
            config
                .library
                .get_or_insert_with(LibraryConfig::default)
                .name = Some(name);
        }

        if let Some(paths) = env::var_os("CLASP_SEARCH_PATH") {
            let library = config.library.get_or_insert_with(LibraryConfig::default);
            let mut merged: Vec<PathBuf> = env::split_paths(&paths)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            merged.append(&mut library.search_paths);
            library.search_paths = merged;
        }

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the effective library name (project > global > default)
    pub fn library_name(&self) -> &str {
        self.project
            .library_name()
            .or_else(|| self.global.default_library())
            .unwrap_or(DEFAULT_LIBRARY)
    }

    /// Configured search paths, project entries first
    ///
    /// Relative entries resolve against the directory of the file that named them.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let project = self
            .project
            .search_paths()
            .iter()
            .map(|p| resolve(self.project_root.as_deref(), p));
        let global = self
            .global
            .search_paths()
            .iter()
            .map(|p| resolve(self.global_root.as_deref(), p));
        project.chain(global).collect()
    }

    /// Capabilities that must resolve when the library is opened
    pub fn required_extensions(&self) -> &[String] {
        self.project.required_extensions()
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if this is a project (has clasp.toml)
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

fn resolve(root: Option<&Path>, path: &Path) -> PathBuf {
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_path(dir.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[library]
name = "POCL"
"#,
        );

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.library_name(), "POCL");
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[library]
search-paths = ["vendor/lib"]
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.project_root(), Some(temp_dir.path()));
        // Relative search paths resolve against the project root
        assert_eq!(
            config.search_paths(),
            vec![temp_dir.path().join("vendor/lib")]
        );
    }

    #[test]
    #[serial]
    fn test_no_project_config_uses_default_library() {
        let temp_dir = TempDir::new().unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.library_name(), DEFAULT_LIBRARY);
        assert!(!config.is_project());
    }

    #[test]
    #[serial]
    fn test_env_override_library() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[library]
name = "POCL"
"#,
        );

        env::set_var("CLASP_LIBRARY", "OpenCL");

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.library_name(), "OpenCL");

        env::remove_var("CLASP_LIBRARY");
    }

    #[test]
    #[serial]
    fn test_env_search_path_comes_first() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[library]
search-paths = ["/opt/configured"]
"#,
        );

        let joined = env::join_paths([Path::new("/opt/env-a"), Path::new("/opt/env-b")]).unwrap();
        env::set_var("CLASP_SEARCH_PATH", &joined);

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(
            config.search_paths(),
            vec![
                PathBuf::from("/opt/env-a"),
                PathBuf::from("/opt/env-b"),
                PathBuf::from("/opt/configured"),
            ]
        );

        env::remove_var("CLASP_SEARCH_PATH");
    }

    #[test]
    #[serial]
    fn test_relative_global_path_resolves_against_global_dir() {
        let temp_dir = TempDir::new().unwrap();
        let global_dir = temp_dir.path().join("home").join(".clasp");
        fs::create_dir_all(&global_dir).unwrap();
        let global_path = global_dir.join("config.toml");
        fs::write(&global_path, "[defaults]\nsearch-paths = [\"vendor\"]\n").unwrap();

        let project_dir = temp_dir.path().join("proj");
        fs::create_dir(&project_dir).unwrap();
        let project_file = create_config_file(&project_dir, "[library]\nsearch-paths = [\"lib\"]\n");

        let mut loader = ConfigLoader::with_global_path(&global_path);
        let expected = vec![project_dir.join("lib"), global_dir.join("vendor")];
        assert_eq!(
            loader.load_from_directory(&project_dir).unwrap().search_paths(),
            expected
        );
        assert_eq!(
            loader.load_from_file(&project_file).unwrap().search_paths(),
            expected
        );
    }

    #[test]
    #[serial]
    fn test_malformed_global_config_fails_both_entry_points() {
        let temp_dir = TempDir::new().unwrap();
        let global_path = temp_dir.path().join("global.toml");
        fs::write(&global_path, "[defaults\nname=").unwrap();

        let project_dir = temp_dir.path().join("proj");
        fs::create_dir(&project_dir).unwrap();
        let project_file = create_config_file(&project_dir, "[library]\nname = \"POCL\"\n");

        let mut loader = ConfigLoader::with_global_path(&global_path);
        assert!(matches!(
            loader.load_from_directory(&project_dir),
            Err(ConfigError::TomlParseError { .. })
        ));
        assert!(matches!(
            loader.load_from_file(&project_file),
            Err(ConfigError::TomlParseError { .. })
        ));
    }

    #[test]
    fn test_default_library() {
        let config = Config::default();
        assert_eq!(config.library_name(), "OpenCL");
        assert!(config.required_extensions().is_empty());
    }
}
