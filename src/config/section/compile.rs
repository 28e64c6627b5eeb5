//! `[compile]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [compile]
//! debounce_ms = 300           # Quiet period before a compile is sent
//! init_timeout_secs = 30      # Ceiling for the toolchain handshake
//! request_timeout_secs = 60   # Ceiling for every other request
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    pub debounce_ms: u64,
    pub init_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            init_timeout_secs: 30,
            request_timeout_secs: 60,
        }
    }
}

impl CompileConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.init_timeout_secs == 0 {
            diag.error("compile.init_timeout_secs", "must be greater than 0");
        }
        if self.request_timeout_secs == 0 {
            diag.error("compile.request_timeout_secs", "must be greater than 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::config::{ConfigDiagnostics, test_parse_config};

    #[test]
    fn test_compile_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.compile.debounce(), Duration::from_millis(300));
        assert_eq!(config.compile.init_timeout(), Duration::from_secs(30));
        assert_eq!(config.compile.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_compile_zero_debounce_is_allowed() {
        let config = test_parse_config("[compile]\ndebounce_ms = 0");
        let mut diag = ConfigDiagnostics::new();
        config.compile.validate(&mut diag);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_compile_zero_timeout_rejected() {
        let config = test_parse_config("[compile]\nrequest_timeout_secs = 0");
        let mut diag = ConfigDiagnostics::new();
        config.compile.validate(&mut diag);
        assert_eq!(diag.len(), 1);
    }
}
