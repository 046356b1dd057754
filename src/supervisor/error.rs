//! Error types for the supervisor.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reading, writing or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed settings file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Errors raised while preparing, spawning or terminating the script.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Monitoring script missing on disk
    #[error("monitoring script not found at {}", .0.display())]
    ScriptNotFound(PathBuf),

    /// Reading the script or writing its configured copy failed
    #[error("failed to prepare script: {0}")]
    Script(#[source] std::io::Error),

    /// The OS refused to start the child
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A pipe of the spawned child was not captured
    #[error("child {0} was not captured")]
    MissingPipe(&'static str),

    /// Signalling or reaping the child failed
    #[error("failed to terminate child: {0}")]
    Termination(#[source] std::io::Error),
}
