//! Settings command: show what the supervisor would load.

use crate::cli::SettingsArgs;
use crate::config::LotusConfig;
use crate::supervisor::SettingsStore;

/// Render the settings file location and its effective contents.
pub fn render_settings(store: &SettingsStore) -> Result<String, Box<dyn std::error::Error>> {
    let exists = store.path().exists();
    let settings = store.load();
    let body = serde_json::to_string_pretty(&settings)?;
    let note = if exists { "" } else { " (not found, defaults)" };
    Ok(format!("{}{}\n{}", store.path().display(), note, body))
}

/// Handle `lotuswifi settings` command
pub fn handle_settings(args: &SettingsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        LotusConfig::load(Some(&args.config))?
    } else {
        LotusConfig::default()
    }
    .with_env_overrides();
    if let Some(ref dir) = args.settings_dir {
        config.supervisor.settings_dir = Some(dir.clone());
    }

    let store = SettingsStore::in_dir(config.supervisor.resolved_settings_dir());
    println!("{}", render_settings(&store)?);
    Ok(())
}
