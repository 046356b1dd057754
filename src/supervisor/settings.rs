//! User-facing monitor settings and their JSON store.

use super::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the settings document inside the settings directory.
pub const SETTINGS_FILE_NAME: &str = "lotuswifi.json";

/// Longest hostname accepted for `ping_host`.
const MAX_HOST_LEN: usize = 253;

/// Settings consumed by the monitoring script.
///
/// Missing keys fall back to their defaults when loaded, so older or
/// hand-edited files never fail on absent fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Latency threshold in milliseconds above which the script cycles Wi-Fi
    pub max_latency: u32,
    /// Seconds between pings
    pub check_interval: u32,
    /// Hostname or IP address to ping
    pub ping_host: String,
    /// Whether monitoring should be running
    pub enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_latency: 100,
            check_interval: 10,
            ping_host: "8.8.8.8".to_string(),
            enabled: false,
        }
    }
}

impl Settings {
    /// Return a copy with every field present in `update` applied.
    pub fn merged(&self, update: &SettingsUpdate) -> Self {
        Self {
            max_latency: update.max_latency.unwrap_or(self.max_latency),
            check_interval: update.check_interval.unwrap_or(self.check_interval),
            ping_host: update
                .ping_host
                .clone()
                .unwrap_or_else(|| self.ping_host.clone()),
            enabled: update.enabled.unwrap_or(self.enabled),
        }
    }

    /// True when moving from `self` to `next` changes a value baked into
    /// the running script, which forces a stop/start cycle.
    pub fn requires_restart(&self, next: &Settings) -> bool {
        self.max_latency != next.max_latency
            || self.check_interval != next.check_interval
            || self.ping_host != next.ping_host
    }
}

/// Partial settings as sent by the host; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl SettingsUpdate {
    /// Reject values that the script cannot use.
    ///
    /// `ping_host` ends up inside a shell assignment, so it is restricted to
    /// characters that appear in hostnames and IPv4/IPv6 literals.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if let Some(max_latency) = self.max_latency {
            check_max_latency(max_latency)?;
        }
        if let Some(check_interval) = self.check_interval {
            check_check_interval(check_interval)?;
        }
        if let Some(host) = &self.ping_host {
            check_ping_host(host)?;
        }
        Ok(())
    }
}

impl Settings {
    /// Apply the same checks as [`SettingsUpdate::validate`] to a full
    /// settings document.
    pub fn validate(&self) -> Result<(), SettingsError> {
        check_max_latency(self.max_latency)?;
        check_check_interval(self.check_interval)?;
        check_ping_host(&self.ping_host)
    }

    /// Replace every invalid field with its default, logging each fallback.
    pub fn sanitized(self) -> Self {
        let defaults = Settings::default();
        let mut settings = self;
        if let Err(e) = check_max_latency(settings.max_latency) {
            tracing::warn!(error = %e, fallback = defaults.max_latency, "Ignoring persisted value");
            settings.max_latency = defaults.max_latency;
        }
        if let Err(e) = check_check_interval(settings.check_interval) {
            tracing::warn!(error = %e, fallback = defaults.check_interval, "Ignoring persisted value");
            settings.check_interval = defaults.check_interval;
        }
        if let Err(e) = check_ping_host(&settings.ping_host) {
            tracing::warn!(error = %e, fallback = %defaults.ping_host, "Ignoring persisted value");
            settings.ping_host = defaults.ping_host;
        }
        settings
    }
}

fn check_max_latency(max_latency: u32) -> Result<(), SettingsError> {
    if max_latency == 0 {
        return Err(SettingsError::Invalid {
            field: "max_latency",
            message: "must be at least 1 ms".to_string(),
        });
    }
    Ok(())
}

fn check_check_interval(check_interval: u32) -> Result<(), SettingsError> {
    if check_interval == 0 {
        return Err(SettingsError::Invalid {
            field: "check_interval",
            message: "must be at least 1 second".to_string(),
        });
    }
    Ok(())
}

fn check_ping_host(host: &str) -> Result<(), SettingsError> {
    if host.is_empty() {
        return Err(SettingsError::Invalid {
            field: "ping_host",
            message: "cannot be empty".to_string(),
        });
    }
    if host.len() > MAX_HOST_LEN {
        return Err(SettingsError::Invalid {
            field: "ping_host",
            message: format!("longer than {} characters", MAX_HOST_LEN),
        });
    }
    if let Some(bad) = host
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':')))
    {
        return Err(SettingsError::Invalid {
            field: "ping_host",
            message: format!("contains invalid character '{}'", bad),
        });
    }
    Ok(())
}

/// JSON file holding the persisted [`Settings`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store backed by `lotuswifi.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SETTINGS_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the settings file.
    ///
    /// A missing file yields `Ok(None)`; callers treat that as "use defaults".
    pub fn read(&self) -> Result<Option<Settings>, SettingsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let settings = serde_json::from_str(&content)
            .map_err(|e| SettingsError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        Ok(Some(settings))
    }

    /// Load settings, falling back to defaults when the file is missing or
    /// cannot be read, and per field when a stored value is invalid.
    /// Failures are logged, never returned.
    pub fn load(&self) -> Settings {
        match self.read() {
            Ok(Some(settings)) => {
                tracing::debug!(path = %self.path.display(), "Loaded persisted settings");
                settings.sanitized()
            }
            Ok(None) => {
                tracing::debug!(
                    path = %self.path.display(),
                    "Settings file not found, using defaults"
                );
                Settings::default()
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Write settings as pretty-printed JSON, creating the directory first.
    ///
    /// The document is written to a sibling temporary file and renamed over
    /// the old one, so a reader sees either the old or the new settings.
    pub fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_string_pretty(settings)
            .map_err(|e| SettingsError::Parse {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        let mut file = tempfile::Builder::new()
            .prefix(".lotuswifi")
            .suffix(".json.tmp")
            .tempfile_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| SettingsError::Io(e.error))?;
        Ok(())
    }
}
