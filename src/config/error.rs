//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ConfigError::NotFound(PathBuf::from("lotuswifi.toml"));
        assert_eq!(err.to_string(), "Config file not found: lotuswifi.toml");
    }

    #[test]
    fn test_validation_display() {
        let err = ConfigError::Validation {
            field: "supervisor.event_capacity".to_string(),
            message: "event capacity must be non-zero".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for 'supervisor.event_capacity': event capacity must be non-zero"
        );
    }
}
