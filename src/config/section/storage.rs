//! `[storage]` section configuration.
//!
//! Relative paths are resolved against the directory holding `booklet.toml`.
//!
//! # Example
//!
//! ```toml
//! [storage]
//! data_dir = ".booklet/data"   # Document, blobs, versions and branches
//! cache_dir = ".booklet/cache" # Downloaded fonts, modules and packages
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".booklet/data".into(),
            cache_dir: ".booklet/cache".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::config::test_parse_config;

    #[test]
    fn test_storage_config() {
        let config = test_parse_config("[storage]\ndata_dir = \"state\"");
        assert_eq!(config.storage.data_dir, Path::new("state"));
        assert_eq!(config.storage.cache_dir, Path::new(".booklet/cache"));
    }
}
