//! Native library configuration
//!
//! Sources are layered, later wins: built-in defaults, an optional file
//! (TOML, YAML or JSON chosen by extension), then `CVGPU_*` environment
//! variables.

use crate::error::GpuError;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding [`EngineConfig::extern_library`]
pub const ENV_EXTERN_LIBRARY: &str = "CVGPU_EXTERN_LIBRARY";
/// Environment variable overriding [`EngineConfig::core_library`]
pub const ENV_CORE_LIBRARY: &str = "CVGPU_CORE_LIBRARY";
/// Environment variable replacing [`EngineConfig::search_paths`] (platform path list)
pub const ENV_LIBRARY_PATH: &str = "CVGPU_LIBRARY_PATH";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Extension is not toml, yaml, yml or json
    #[error("unsupported configuration format: {path}")]
    UnsupportedFormat {
        /// File path
        path: PathBuf,
    },
}

impl From<ConfigError> for GpuError {
    fn from(err: ConfigError) -> Self {
        GpuError::Config {
            message: err.to_string(),
        }
    }
}

/// Where to find the native libraries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Library exporting the `gpu*` entry points
    #[serde(default = "default_extern_library")]
    pub extern_library: String,

    /// Library exporting the core C API (`cvCreateMatHeader`, `cvRedirectError`, ...)
    #[serde(default = "default_core_library")]
    pub core_library: String,

    /// Directories searched before the system loader paths
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
}

fn default_extern_library() -> String {
    "cvextern".to_string()
}

fn default_core_library() -> String {
    "opencv_core".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extern_library: default_extern_library(),
            core_library: default_core_library(),
            search_paths: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var_os(key));
        config
    }

    /// Load a file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env(|key| std::env::var_os(key));
        Ok(config)
    }

    /// Load a file without looking at the environment
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match extension.as_deref() {
            Some("toml") => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))
            }
            Some("json") => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Apply overrides from a variable lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(value) = non_empty(ENV_EXTERN_LIBRARY) {
            self.extern_library = value.to_string_lossy().into_owned();
        }
        if let Some(value) = non_empty(ENV_CORE_LIBRARY) {
            self.core_library = value.to_string_lossy().into_owned();
        }
        if let Some(value) = non_empty(ENV_LIBRARY_PATH) {
            self.search_paths = std::env::split_paths(&value).collect();
        }
    }

    /// Paths to try, in order, when opening `library`.
    ///
    /// A bare name (no path separator) is expanded with the platform prefix
    /// and suffix and tried in every search path, then handed to the system
    /// loader. Anything that looks like a path is used as is.
    pub fn candidates(&self, library: &str) -> Vec<OsString> {
        let as_path = Path::new(library);
        if as_path.components().count() > 1 || as_path.extension().is_some() {
            return vec![OsString::from(library)];
        }

        let file_name = libloading::library_filename(library);
        let mut candidates: Vec<OsString> = self
            .search_paths
            .iter()
            .map(|dir| dir.join(&file_name).into_os_string())
            .collect();
        candidates.push(file_name);
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.extern_library, "cvextern");
        assert_eq!(config.core_library, "opencv_core");
        assert!(config.search_paths.is_empty());
    }

    #[test]
    fn test_load_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cvgpu.toml");
        fs::write(
            &path,
            r#"
extern_library = "cvextern_cuda"
search_paths = ["/opt/emgu/lib"]
"#,
        )
        .unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.extern_library, "cvextern_cuda");
        assert_eq!(config.core_library, "opencv_core");
        assert_eq!(config.search_paths, vec![PathBuf::from("/opt/emgu/lib")]);
    }

    #[test]
    fn test_load_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cvgpu.yaml");
        fs::write(
            &path,
            "core_library: opencv_core220\nsearch_paths:\n  - /usr/local/lib\n",
        )
        .unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.core_library, "opencv_core220");
        assert_eq!(config.extern_library, "cvextern");
        assert_eq!(config.search_paths, vec![PathBuf::from("/usr/local/lib")]);
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cvgpu.json");
        fs::write(&path, r#"{"extern_library": "/tmp/libcvextern.so"}"#).unwrap();

        let config = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.extern_library, "/tmp/libcvextern.so");
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cvgpu.ini");
        fs::write(&path, "extern_library=x").unwrap();

        let result = EngineConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let result = EngineConfig::load_from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "extern_library = [").unwrap();

        let err = EngineConfig::load_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let gpu_err: GpuError = err.into();
        assert!(matches!(gpu_err, GpuError::Config { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        let joined = std::env::join_paths(["/a", "/b"]).unwrap();
        let joined = joined.to_str().unwrap().to_string();
        config.apply_env(lookup(&[
            (ENV_EXTERN_LIBRARY, "cvextern_test"),
            (ENV_LIBRARY_PATH, joined.as_str()),
        ]));

        assert_eq!(config.extern_library, "cvextern_test");
        assert_eq!(config.core_library, "opencv_core");
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = EngineConfig::default();
        config.apply_env(lookup(&[(ENV_CORE_LIBRARY, "")]));
        assert_eq!(config.core_library, "opencv_core");
    }

    #[test]
    fn test_candidates_bare_name() {
        let config = EngineConfig {
            search_paths: vec![PathBuf::from("/opt/lib")],
            ..EngineConfig::default()
        };
        let candidates = config.candidates("cvextern");
        let file_name = libloading::library_filename("cvextern");
        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0],
            PathBuf::from("/opt/lib").join(&file_name).into_os_string()
        );
        assert_eq!(candidates[1], file_name);
    }

    #[test]
    fn test_candidates_explicit_path() {
        let config = EngineConfig::default();
        let candidates = config.candidates("/usr/lib/libcvextern.so");
        assert_eq!(candidates, vec![OsString::from("/usr/lib/libcvextern.so")]);
    }
}
