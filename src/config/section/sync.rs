//! `[sync]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [sync]
//! remote = "/mnt/shared/booklets"  # Shared directory acting as the remote
//! prefix = "xcpc"                  # Namespace inside the remote
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Remote root; sync commands fail while unset.
    pub remote: Option<PathBuf>,
    pub prefix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: None,
            prefix: "xcpc".into(),
        }
    }
}

impl SyncConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.prefix.contains("..") {
            diag.error("sync.prefix", "must not contain `..`");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{ConfigDiagnostics, test_parse_config};

    #[test]
    fn test_sync_defaults() {
        let config = test_parse_config("");
        assert!(config.sync.remote.is_none());
        assert_eq!(config.sync.prefix, "xcpc");
    }

    #[test]
    fn test_sync_prefix_validation() {
        let config = test_parse_config("[sync]\nprefix = \"../up\"");
        let mut diag = ConfigDiagnostics::new();
        config.sync.validate(&mut diag);
        assert_eq!(diag.len(), 1);
    }
}
