//! Runtime configuration
//!
//! Loaded from a TOML file when one is given, otherwise built-in defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HornetError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Live-capture tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Snapshot length per packet
    pub snaplen: i32,
    /// Enable promiscuous mode
    pub promiscuous: bool,
    /// Read timeout in milliseconds
    pub timeout_ms: i32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: 65535,
            promiscuous: true,
            timeout_ms: 100,
        }
    }
}

/// TCP session table tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum concurrent sessions before forced eviction
    pub table_size: usize,
    /// Idle seconds before a session is reaped
    pub timeout_sec: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            table_size: 65535,
            timeout_sec: 300,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HornetError::Config(format!("failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HornetError::Config(format!("failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.capture.snaplen, 65535);
        assert!(config.capture.promiscuous);
        assert_eq!(config.session.table_size, 65535);
        assert_eq!(config.session.timeout_sec, 300);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [session]
            table_size = 1024
            timeout_sec = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.session.table_size, 1024);
        assert_eq!(config.session.timeout_sec, 60);
        assert_eq!(config.capture.snaplen, 65535);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("not toml at all ["),
            Err(HornetError::Config(_))
        ));
    }
}
