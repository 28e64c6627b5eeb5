//! Booklet configuration management.
//!
//! Handles loading and validating `booklet.toml` configuration files.
//!
//! # Sections
//!
//! | Section       | Purpose                                      |
//! |---------------|----------------------------------------------|
//! | `[toolchain]` | Engine modules, fonts and packages           |
//! | `[compile]`   | Debounce window and request timeouts         |
//! | `[storage]`   | Data and cache directories                   |
//! | `[sync]`      | Shared remote directory and prefix           |
//!
//! A missing file is not an error: every section has defaults and the
//! directory the command runs in becomes the project root.

mod error;
mod section;

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

pub use error::{ConfigDiagnostics, ConfigError};
pub use section::{CompileConfig, FontEntry, StorageConfig, SyncConfig, ToolchainConfig};

/// Configuration file name searched for upward from the working directory.
pub const CONFIG_FILE: &str = "booklet.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookletConfig {
    /// Absolute path to the config file, if one was found (internal use only)
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    pub toolchain: ToolchainConfig,
    pub compile: CompileConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

impl BookletConfig {
    /// Load the configuration.
    ///
    /// With `explicit`, that file must exist. Otherwise `booklet.toml` is
    /// searched upward from the working directory, falling back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir()
            .map_err(|err| ConfigError::Io(PathBuf::from("."), err))?;

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(&cwd, Path::new(CONFIG_FILE)),
        };

        let mut config = match &path {
            Some(path) => Self::from_path(path)?,
            None => {
                crate::debug!("config"; "no {} found, using defaults", CONFIG_FILE);
                Self::default()
            }
        };

        config.root = path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        config.config_path = path;
        config.validate()?;
        Ok(config)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let (config, _) = Self::parse_with_ignored(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            crate::log!(
                "config";
                "ignoring unknown fields in {}: {}",
                CONFIG_FILE,
                ignored.join(", ")
            );
        }
        Ok(config)
    }

    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    /// Validate every section, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();
        self.toolchain.validate(&mut diag);
        self.compile.validate(&mut diag);
        self.sync.validate(&mut diag);
        diag.into_result()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(&self.storage.data_dir)
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.storage.cache_dir)
    }

    /// Sync remote, resolved against the project root.
    pub fn sync_remote(&self) -> Option<PathBuf> {
        self.sync.remote.as_ref().map(|remote| self.root.join(remote))
    }
}

/// Find config file by searching upward from `start`
///
/// Walks up parent directories until finding `config_name`
///
/// # Example
/// ```text
/// /home/user/contest/problems/  ← start
/// /home/user/contest/booklet.toml  ← found!
/// ```
pub fn find_config_file(start: &Path, config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config text, failing on unknown fields.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> BookletConfig {
    let (parsed, ignored) = BookletConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

// ============================================================================
// tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_file_matches_defaults() {
        let parsed = test_parse_config(crate::embed::DEFAULT_CONFIG);
        assert_eq!(parsed, BookletConfig::default());
    }

    #[test]
    fn test_unknown_fields_are_collected() {
        let (_, ignored) =
            BookletConfig::parse_with_ignored("[compile]\ndebounce = 5\n[extra]\nx = 1").unwrap();
        assert_eq!(ignored.len(), 2);
    }

    #[test]
    fn test_find_config_file_walks_upward() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();

        let found = find_config_file(&nested, Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));
    }

    #[test]
    fn test_find_config_file_missing() {
        let dir = TempDir::new().unwrap();
        assert!(find_config_file(dir.path(), Path::new("no-such-booklet-config.toml")).is_none());
    }

    #[test]
    fn test_load_explicit_file_sets_root() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[storage]\ndata_dir = \"state\"").unwrap();

        let config = BookletConfig::load(Some(&path)).unwrap();
        assert_eq!(config.root, dir.path());
        assert_eq!(config.data_dir(), dir.path().join("state"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = BookletConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::Io(..))));
    }

    #[test]
    fn test_load_reports_validation_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, "[toolchain]\nfonts = []").unwrap();

        let result = BookletConfig::load(Some(&path));
        assert!(matches!(result, Err(ConfigError::Diagnostics(_))));
    }
}
