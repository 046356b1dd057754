//! Configuration for the script supervisor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable set by the plugin host to the per-plugin settings directory.
pub const HOST_SETTINGS_DIR_ENV: &str = "DECKY_PLUGIN_SETTINGS_DIR";

/// Where and how the monitoring script is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Monitoring script shipped with the plugin
    pub script_path: PathBuf,
    /// Program used to run the configured copy; empty executes it directly
    pub interpreter: String,
    /// Directory holding `lotuswifi.json`; resolved at runtime when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settings_dir: Option<PathBuf>,
    /// Directory for configured script copies; system temp dir when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout_seconds: u64,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            script_path: PathBuf::from("wifitoggler"),
            interpreter: "bash".to_string(),
            settings_dir: None,
            temp_dir: None,
            stop_timeout_seconds: 5,
            event_capacity: 64,
        }
    }
}

impl SupervisorConfig {
    /// Settings directory: explicit config, then the host-provided
    /// directory, then the user config dir.
    pub fn resolved_settings_dir(&self) -> PathBuf {
        if let Some(dir) = &self.settings_dir {
            return dir.clone();
        }
        if let Some(dir) = std::env::var_os(HOST_SETTINGS_DIR_ENV) {
            if !dir.is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::config_dir()
            .map(|dir| dir.join("lotuswifi"))
            .unwrap_or_else(|| PathBuf::from("settings"))
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }
}
