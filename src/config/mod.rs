//! Configuration module for the LotusWiFi supervisor
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`LOTUSWIFI_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use lotuswifi::config::LotusConfig;
//!
//! // Load defaults
//! let config = LotusConfig::default();
//! assert_eq!(config.supervisor.stop_timeout_seconds, 5);
//!
//! // Parse from TOML
//! let toml = r#"
//! [supervisor]
//! script_path = "/opt/lotuswifi/wifitoggler"
//! "#;
//! let config: LotusConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.supervisor.interpreter, "bash");
//! ```

pub mod error;
pub mod logging;

pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};

// Re-export SupervisorConfig from supervisor module
pub use crate::supervisor::SupervisorConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Unified configuration for the supervisor binary.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LotusConfig {
    /// Script and settings locations
    pub supervisor: SupervisorConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl LotusConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports LOTUSWIFI_* environment variables.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(script) = std::env::var("LOTUSWIFI_SCRIPT") {
            if !script.is_empty() {
                self.supervisor.script_path = PathBuf::from(script);
            }
        }
        if let Ok(dir) = std::env::var("LOTUSWIFI_SETTINGS_DIR") {
            if !dir.is_empty() {
                self.supervisor.settings_dir = Some(PathBuf::from(dir));
            }
        }

        // Logging settings
        if let Ok(level) = std::env::var("LOTUSWIFI_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("LOTUSWIFI_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.script_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation {
                field: "supervisor.script_path".to_string(),
                message: "script path cannot be empty".to_string(),
            });
        }
        if self.supervisor.stop_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "supervisor.stop_timeout_seconds".to_string(),
                message: "stop timeout must be non-zero".to_string(),
            });
        }
        if self.supervisor.event_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "supervisor.event_capacity".to_string(),
                message: "event capacity must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}
