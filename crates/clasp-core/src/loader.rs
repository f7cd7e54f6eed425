//! Dynamic loading of the foreign library
//!
//! Provides cross-platform library loading using `libloading`. Handles
//! platform-specific library naming conventions and search paths, and
//! exposes a loaded library as a [`CapabilitySource`].

use crate::error::{GateError, GateResult};
use crate::ext::CapabilitySource;
use clasp_config::Config;
use libloading::Library;
use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Library loading errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// The dynamic loader rejected the file
    #[error("failed to load library {}: {message}", .path.display())]
    LoadFailed { path: PathBuf, message: String },

    /// Empty name, or a name that cannot be passed to the loader
    #[error("invalid library name: {0:?}")]
    InvalidName(String),
}

/// Dynamic library loader with caching and platform-specific path resolution
///
/// # Safety
///
/// Loading a dynamic library runs its initialization code inside this
/// process. Only load trusted libraries.
pub struct LibraryLoader {
    /// Cache of loaded libraries by resolved path
    loaded: HashMap<PathBuf, Arc<Library>>,
    /// Search paths, highest priority first
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Create a loader with the platform default search paths
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            search_paths: Self::default_search_paths(),
        }
    }

    /// Create a loader whose configured search paths come before the defaults
    pub fn from_config(config: &Config) -> Self {
        let mut loader = Self::new();
        for path in config.search_paths().into_iter().rev() {
            loader.add_search_path(path);
        }
        loader
    }

    /// Platform default library search paths
    ///
    /// - Linux: /usr/lib, /usr/local/lib, /lib (plus lib64 variants)
    /// - macOS: /usr/lib, /usr/local/lib, /opt/homebrew/lib,
    ///   /System/Library/Frameworks/OpenCL.framework
    /// - Windows: System32
    /// - All platforms: current working directory first
    fn default_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(target_os = "linux")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/lib"));
            if cfg!(target_pointer_width = "64") {
                paths.push(PathBuf::from("/usr/lib64"));
                paths.push(PathBuf::from("/lib64"));
                paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu"));
            }
        }

        #[cfg(target_os = "macos")]
        {
            paths.push(PathBuf::from("/usr/lib"));
            paths.push(PathBuf::from("/usr/local/lib"));
            paths.push(PathBuf::from("/opt/homebrew/lib"));
            paths.push(PathBuf::from("/System/Library/Frameworks/OpenCL.framework"));
        }

        #[cfg(target_os = "windows")]
        {
            paths.push(PathBuf::from("C:\\Windows\\System32"));
            if let Ok(system_root) = std::env::var("SystemRoot") {
                paths.push(PathBuf::from(format!("{}\\System32", system_root)));
            }
        }

        if let Ok(cwd) = std::env::current_dir() {
            paths.insert(0, cwd);
        }

        paths
    }

    /// Candidate file names for a short library name, in priority order
    fn candidate_names(name: &str) -> Vec<String> {
        let extensions: &[&str] = if cfg!(target_os = "windows") {
            &["dll"]
        } else if cfg!(target_os = "macos") {
            &["dylib", "so"]
        } else {
            &["so", "so.1"]
        };
        let prefixes: &[&str] = if cfg!(target_os = "windows") {
            &["", "lib"]
        } else {
            &["lib", ""]
        };

        let mut names = Vec::new();
        for prefix in prefixes {
            for ext in extensions {
                names.push(format!("{}{}.{}", prefix, name, ext));
            }
        }
        // Framework binaries carry the bare name
        if cfg!(target_os = "macos") {
            names.push(name.to_string());
        }
        names
    }

    /// Resolve a library name to a file in the search paths
    fn resolve_library_path(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return path.exists().then(|| path.to_path_buf());
        }

        let candidates = Self::candidate_names(name);
        self.search_paths.iter().find_map(|dir| {
            candidates
                .iter()
                .map(|file| dir.join(file))
                .find(|full| full.is_file())
        })
    }

    /// Load a library by short name or absolute path
    ///
    /// Returns the cached library if the same file was loaded before.
    pub fn load(&mut self, name: &str) -> Result<ForeignLibrary, LoadError> {
        if name.trim().is_empty() || name.contains('\0') {
            return Err(LoadError::InvalidName(name.to_string()));
        }
        let path = self
            .resolve_library_path(name)
            .ok_or_else(|| LoadError::LibraryNotFound(name.to_string()))?;

        if let Some(library) = self.loaded.get(&path) {
            return Ok(ForeignLibrary {
                name: name.to_string(),
                path,
                library: Arc::clone(library),
            });
        }

        // SAFETY: loading runs the library's initializers; callers choose
        // which library to trust
        let library = unsafe { Library::new(&path) }.map_err(|e| LoadError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let library = Arc::new(library);
        tracing::debug!(library = name, path = %path.display(), "loaded foreign library");

        self.loaded.insert(path.clone(), Arc::clone(&library));
        Ok(ForeignLibrary {
            name: name.to_string(),
            path,
            library,
        })
    }

    /// Load the library named by `config` and check its required capabilities
    pub fn open(&mut self, config: &Config) -> GateResult<ForeignLibrary> {
        let library = self.load(config.library_name())?;
        library.check_required(config.required_extensions())?;
        Ok(library)
    }

    /// Add a search path ahead of all others
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    /// Current search paths, highest priority first
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Number of distinct library files loaded
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// One loaded foreign library
///
/// Clones share the same underlying library, which is unloaded when the
/// last clone and its loader are gone.
#[derive(Clone)]
pub struct ForeignLibrary {
    name: String,
    path: PathBuf,
    library: Arc<Library>,
}

impl ForeignLibrary {
    /// Name the library was requested under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File the library was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve every name in `names`, failing on the first one missing
    pub fn check_required<I, S>(&self, names: I) -> GateResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref();
            let c_name = std::ffi::CString::new(name)
                .map_err(|_| GateError::unavailable(name))?;
            if self.lookup(&c_name).is_null() {
                return Err(GateError::unavailable(name));
            }
        }
        Ok(())
    }
}

impl CapabilitySource for ForeignLibrary {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        // SAFETY: the symbol is only read as an address, never called here
        match unsafe { self.library.get::<*mut c_void>(name.to_bytes_with_nul()) } {
            Ok(symbol) => *symbol,
            Err(_) => std::ptr::null_mut(),
        }
    }
}

impl std::fmt::Debug for ForeignLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignLibrary")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}
