//! CLI module for the LotusWiFi supervisor
//!
//! # Commands
//!
//! - `run` - Supervise the monitoring script and serve the host bridge on stdin/stdout
//! - `settings` - Show the persisted monitor settings
//! - `config` - Configuration utilities (init)
//! - `completions` - Generate shell completions
//!
//! # Example
//!
//! ```bash
//! # Run with the script next to the binary
//! lotuswifi run --script ./wifitoggler
//!
//! # Inspect what will be used on the next load
//! lotuswifi settings
//! ```

pub mod completions;
pub mod config;
pub mod run;
pub mod settings;

pub use completions::handle_completions;
pub use config::handle_config_init;
pub use settings::handle_settings;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// LotusWiFi - Wi-Fi latency monitor supervisor
#[derive(Parser, Debug)]
#[command(
    name = "lotuswifi",
    version,
    about = "Supervisor for the LotusWiFi latency monitoring script"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Supervise the monitoring script and serve host requests on stdin/stdout
    Run(RunArgs),
    /// Show persisted monitor settings
    Settings(SettingsArgs),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "lotuswifi.toml")]
    pub config: PathBuf,

    /// Override the monitoring script path
    #[arg(short, long, env = "LOTUSWIFI_SCRIPT")]
    pub script: Option<PathBuf>,

    /// Override the settings directory
    #[arg(long, env = "LOTUSWIFI_SETTINGS_DIR")]
    pub settings_dir: Option<PathBuf>,

    /// Override the interpreter used to run the script ("" runs it directly)
    #[arg(long)]
    pub interpreter: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOTUSWIFI_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Args, Debug)]
pub struct SettingsArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "lotuswifi.toml")]
    pub config: PathBuf,

    /// Override the settings directory
    #[arg(long, env = "LOTUSWIFI_SETTINGS_DIR")]
    pub settings_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "lotuswifi.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
