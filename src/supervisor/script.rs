//! Per-run copy of the monitoring script with the current settings applied.

use super::error::SupervisorError;
use super::settings::Settings;
use regex::{Captures, Regex};
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tempfile::TempPath;

/// File name prefix of generated script copies.
pub const TEMP_PREFIX: &str = "lotuswifi_";

/// Matches a top-level assignment of one of the configurable variables,
/// whatever its current value.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?P<prefix>[ \t]*(?:(?:export|readonly|local)[ \t]+)?)(?P<name>MAX_LATENCY|CHECK_INTERVAL|PING_HOST)=.*$",
    )
    .expect("valid regex")
});

/// Rewrite the script's configuration declarations with `settings`.
///
/// Lines that do not declare one of the three variables are left untouched.
pub fn render(source: &str, settings: &Settings) -> String {
    DECLARATION
        .replace_all(source, |caps: &Captures| {
            let value = match &caps["name"] {
                "MAX_LATENCY" => settings.max_latency.to_string(),
                "CHECK_INTERVAL" => settings.check_interval.to_string(),
                _ => format!("\"{}\"", settings.ping_host),
            };
            format!("{}{}={}", &caps["prefix"], &caps["name"], value)
        })
        .into_owned()
}

/// Environment passed to the child alongside the rewritten declarations.
pub fn script_env(settings: &Settings) -> [(&'static str, String); 3] {
    [
        ("MAX_LATENCY", settings.max_latency.to_string()),
        ("CHECK_INTERVAL", settings.check_interval.to_string()),
        ("PING_HOST", settings.ping_host.clone()),
    ]
}

/// Executable temporary copy of the script, deleted when dropped or removed.
#[derive(Debug)]
pub struct ConfiguredScript {
    path: TempPath,
}

impl ConfiguredScript {
    /// Render `source_path` with `settings` into a fresh `lotuswifi_*.sh`
    /// file inside `temp_dir` (the system temp directory when `None`).
    pub fn prepare(
        source_path: &Path,
        settings: &Settings,
        temp_dir: Option<&Path>,
    ) -> Result<Self, SupervisorError> {
        if !source_path.exists() {
            return Err(SupervisorError::ScriptNotFound(source_path.to_path_buf()));
        }
        let source = std::fs::read_to_string(source_path).map_err(SupervisorError::Script)?;
        let rendered = render(&source, settings);

        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX).suffix(".sh");
        let mut file = match temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(SupervisorError::Script)?;

        file.write_all(rendered.as_bytes())
            .and_then(|_| file.flush())
            .map_err(SupervisorError::Script)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(0o755))
                .map_err(SupervisorError::Script)?;
        }

        // Close the write handle so the file can be executed directly
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the copy, reporting failures instead of swallowing them.
    pub fn remove(self) -> std::io::Result<()> {
        self.path.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#!/bin/bash
# Wi-Fi toggler
MAX_LATENCY=100
CHECK_INTERVAL=10
PING_HOST="8.8.8.8"

while true; do
    echo "using $PING_HOST"
    sleep $CHECK_INTERVAL
done
"#;

    fn custom_settings() -> Settings {
        Settings {
            max_latency: 250,
            check_interval: 3,
            ping_host: "1.1.1.1".to_string(),
            enabled: true,
        }
    }

    #[test]
    fn test_render_replaces_declarations() {
        let rendered = render(SCRIPT, &custom_settings());
        assert!(rendered.contains("MAX_LATENCY=250\n"));
        assert!(rendered.contains("CHECK_INTERVAL=3\n"));
        assert!(rendered.contains("PING_HOST=\"1.1.1.1\"\n"));
        assert!(!rendered.contains("8.8.8.8"));
    }

    #[test]
    fn test_render_ignores_non_default_literals() {
        let source = "MAX_LATENCY=75\nCHECK_INTERVAL=30\nPING_HOST='example.org'\n";
        let rendered = render(source, &custom_settings());
        assert_eq!(
            rendered,
            "MAX_LATENCY=250\nCHECK_INTERVAL=3\nPING_HOST=\"1.1.1.1\"\n"
        );
    }

    #[test]
    fn test_render_keeps_declaration_prefix() {
        let source = "  export MAX_LATENCY=100\nreadonly PING_HOST=\"8.8.8.8\"\n";
        let rendered = render(source, &custom_settings());
        assert!(rendered.contains("  export MAX_LATENCY=250"));
        assert!(rendered.contains("readonly PING_HOST=\"1.1.1.1\""));
    }

    #[test]
    fn test_render_leaves_usages_alone() {
        let rendered = render(SCRIPT, &custom_settings());
        assert!(rendered.contains("echo \"using $PING_HOST\""));
        assert!(rendered.contains("sleep $CHECK_INTERVAL"));
    }

    #[test]
    fn test_script_env() {
        let env = script_env(&custom_settings());
        assert_eq!(env[0], ("MAX_LATENCY", "250".to_string()));
        assert_eq!(env[1], ("CHECK_INTERVAL", "3".to_string()));
        assert_eq!(env[2], ("PING_HOST", "1.1.1.1".to_string()));
    }

    #[test]
    fn test_prepare_writes_executable_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wifitoggler");
        std::fs::write(&source, SCRIPT).unwrap();

        let script = ConfiguredScript::prepare(&source, &custom_settings(), Some(dir.path()))
            .unwrap();
        let name = script.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(TEMP_PREFIX));
        assert!(name.ends_with(".sh"));

        let content = std::fs::read_to_string(script.path()).unwrap();
        assert!(content.contains("MAX_LATENCY=250"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(script.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }

        // Source is never modified
        assert_eq!(std::fs::read_to_string(&source).unwrap(), SCRIPT);
    }

    #[test]
    fn test_remove_deletes_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wifitoggler");
        std::fs::write(&source, SCRIPT).unwrap();

        let script =
            ConfiguredScript::prepare(&source, &Settings::default(), Some(dir.path())).unwrap();
        let path = script.path().to_path_buf();
        assert!(path.exists());

        script.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfiguredScript::prepare(
            &dir.path().join("missing"),
            &Settings::default(),
            Some(dir.path()),
        );
        assert!(matches!(result, Err(SupervisorError::ScriptNotFound(_))));
    }
}
