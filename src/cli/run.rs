//! Run command implementation

use crate::bridge::{self, SessionEnd};
use crate::cli::RunArgs;
use crate::config::LotusConfig;
use crate::logging::init_tracing;
use crate::supervisor::{Supervisor, SupervisorEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &RunArgs,
) -> Result<LotusConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        LotusConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        LotusConfig::default()
    };

    config = config.with_env_overrides();

    // CLI overrides (highest priority)
    if let Some(ref script) = args.script {
        config.supervisor.script_path = script.clone();
    }
    if let Some(ref dir) = args.settings_dir {
        config.supervisor.settings_dir = Some(dir.clone());
    }
    if let Some(ref interpreter) = args.interpreter {
        config.supervisor.interpreter = interpreter.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    Ok(config)
}

/// Resolves once SIGINT or SIGTERM arrives, then cancels `cancel_token`.
async fn shutdown_signal(cancel_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }

    cancel_token.cancel();
}

/// Main run command handler
pub async fn run_supervisor(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing (stderr only)
    init_tracing(&config.logging)?;
    tracing::debug!(?config, "Loaded configuration");

    // 3. Create the supervisor with its event channel
    let (events_tx, events_rx) =
        broadcast::channel::<SupervisorEvent>(config.supervisor.event_capacity);
    let supervisor = Supervisor::new(config.supervisor, Arc::new(events_tx));

    // 4. Load hook, then serve the host until it goes away
    supervisor.on_load().await;

    let cancel_token = CancellationToken::new();
    let signal_task = tokio::spawn(shutdown_signal(cancel_token.clone()));

    let end = bridge::serve(
        &supervisor,
        tokio::io::stdin(),
        tokio::io::stdout(),
        events_rx,
        cancel_token,
    )
    .await;
    signal_task.abort();

    // 5. Never leave the script running behind us
    let end = match end {
        Ok(end) => end,
        Err(e) => {
            tracing::error!(error = %e, "Host bridge failed");
            SessionEnd::InputClosed
        }
    };
    if !end.hook_ran() {
        supervisor.on_unload().await;
    }

    tracing::info!(?end, "LotusWiFi supervisor exited");
    Ok(())
}
