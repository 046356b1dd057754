//! Supervisor for the Wi-Fi latency monitoring script.
//!
//! This module owns the script's lifecycle, turns its output into status
//! updates and events, and keeps the user settings on disk.

mod config;
mod error;
mod events;
pub mod parser;
mod process;
pub mod script;
mod settings;
mod state;


pub use config::*;
pub use error::*;
pub use events::*;
pub use parser::{parse_line, ScriptLine};
pub use process::ScriptProcess;
pub use script::ConfiguredScript;
pub use settings::*;
pub use state::*;

use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStdout;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Owns the monitoring child, its settings and its last reported status.
///
/// Control operations are serialized: the child slot mutex is held for the
/// whole of `start`, `stop` and `update_settings`. Public operations never
/// return errors; failures are logged and reported as `false`.
pub struct Supervisor {
    config: SupervisorConfig,
    store: SettingsStore,
    shared: Arc<Shared>,
    process: Mutex<Option<ScriptProcess>>,
}

/// State shared with the output consumer task.
struct Shared {
    state: RwLock<SupervisorState>,
    sink: Arc<dyn EventSink>,
}

impl Supervisor {
    /// Create a stopped supervisor with default settings. Call
    /// [`Supervisor::on_load`] to pick up persisted settings.
    pub fn new(config: SupervisorConfig, sink: Arc<dyn EventSink>) -> Self {
        let store = SettingsStore::in_dir(config.resolved_settings_dir());
        Self {
            config,
            store,
            shared: Arc::new(Shared {
                state: RwLock::new(SupervisorState::default()),
                sink,
            }),
            process: Mutex::new(None),
        }
    }

    pub fn settings_store(&self) -> &SettingsStore {
        &self.store
    }

    pub async fn get_settings(&self) -> Settings {
        self.shared.state.read().await.settings.clone()
    }

    pub async fn get_status(&self) -> StatusReport {
        self.shared.state.read().await.report()
    }

    /// Pid of the current child, if one is held (running or not yet reaped).
    pub async fn child_pid(&self) -> Option<u32> {
        self.process.lock().await.as_ref().and_then(|p| p.id())
    }

    /// Merge `update` into the settings, persist them, and apply the change
    /// to the running script.
    ///
    /// The update is transactional: if saving fails the in-memory settings
    /// are left as they were and `false` is returned. A change to a value
    /// baked into the script restarts it; a bare `enabled` toggle starts or
    /// stops monitoring instead.
    pub async fn update_settings(&self, update: SettingsUpdate) -> bool {
        if let Err(e) = update.validate() {
            tracing::warn!(error = %e, "Rejected settings update");
            return false;
        }

        let mut slot = self.process.lock().await;

        let (previous, next, monitoring) = {
            let state = self.shared.state.read().await;
            (
                state.settings.clone(),
                state.settings.merged(&update),
                state.monitor.is_active(),
            )
        };

        if let Err(e) = self.store.save(&next) {
            tracing::error!(
                path = %self.store.path().display(),
                error = %e,
                "Failed to update settings"
            );
            return false;
        }
        self.shared.state.write().await.settings = next.clone();
        tracing::info!(
            max_latency = next.max_latency,
            check_interval = next.check_interval,
            ping_host = %next.ping_host,
            enabled = next.enabled,
            "Settings updated"
        );

        if monitoring && previous.requires_restart(&next) {
            tracing::info!("Script settings changed, restarting monitoring");
            self.stop_locked(&mut slot).await;
            if next.enabled {
                self.start_locked(&mut slot).await;
            }
        } else {
            // Decided from the live state: after an unexpected exit `enabled`
            // is still true while nothing runs.
            match update.enabled {
                Some(true) if !monitoring => {
                    self.start_locked(&mut slot).await;
                }
                Some(false) if monitoring || slot.is_some() => {
                    self.stop_locked(&mut slot).await;
                }
                _ => {}
            }
        }

        true
    }

    /// Start the monitoring script. Returns `true` if it is running
    /// afterwards, including when it already was.
    pub async fn start_monitoring(&self) -> bool {
        let mut slot = self.process.lock().await;
        self.start_locked(&mut slot).await
    }

    /// Stop the monitoring script. Safe to call when nothing runs.
    /// Returns `false` only if terminating the child failed.
    pub async fn stop_monitoring(&self) -> bool {
        let mut slot = self.process.lock().await;
        self.stop_locked(&mut slot).await
    }

    /// Host load hook: make the script executable, restore persisted
    /// settings, and resume monitoring if it was enabled.
    pub async fn on_load(&self) {
        tracing::info!(
            script = %self.config.script_path.display(),
            settings = %self.store.path().display(),
            "LotusWiFi supervisor loaded"
        );
        self.ensure_script_executable();

        let settings = self.store.load();
        let enabled = settings.enabled;
        self.shared.state.write().await.settings = settings;

        if enabled {
            tracing::info!("Monitoring was enabled, resuming");
            self.start_monitoring().await;
        }
    }

    /// Host unload hook: stop monitoring and persist settings.
    ///
    /// The persisted `enabled` flag keeps its pre-unload value so that
    /// monitoring resumes on the next load.
    pub async fn on_unload(&self) {
        let mut slot = self.process.lock().await;
        let enabled = self.shared.state.read().await.settings.enabled;
        self.stop_locked(&mut slot).await;

        let settings = {
            let mut state = self.shared.state.write().await;
            state.settings.enabled = enabled;
            state.settings.clone()
        };
        if let Err(e) = self.store.save(&settings) {
            tracing::error!(error = %e, "Failed to save settings on unload");
        }
        tracing::info!("LotusWiFi supervisor unloaded");
    }

    /// Host uninstall hook: stop monitoring without touching the settings file.
    pub async fn on_uninstall(&self) {
        self.stop_monitoring().await;
        tracing::info!("LotusWiFi supervisor uninstalled");
    }

    async fn start_locked(&self, slot: &mut Option<ScriptProcess>) -> bool {
        let (settings, generation) = {
            let mut state = self.shared.state.write().await;
            if state.monitor.is_active() {
                tracing::debug!("Monitoring already active");
                return true;
            }
            state.monitor = MonitorState::Starting;
            state.generation += 1;
            (state.settings.clone(), state.generation)
        };

        // A child that exited on its own is still held until reaped
        if let Some(stale) = slot.take() {
            if let Err(e) = stale.shutdown(self.config.stop_timeout()).await {
                tracing::warn!(error = %e, "Failed to reap previous monitoring script");
            }
        }

        let mut process = match self.launch(&settings) {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start monitoring script");
                self.shared.state.write().await.monitor = MonitorState::Stopped;
                return false;
            }
        };

        {
            let mut state = self.shared.state.write().await;
            state.monitor = MonitorState::Running;
            state.settings.enabled = true;
        }
        tracing::info!(
            pid = process.id(),
            generation,
            "Wi-Fi monitoring script started"
        );
        self.shared
            .sink
            .emit(SupervisorEvent::WifiStatusChanged { monitoring: true });

        if let Some(stdout) = process.take_stdout() {
            let handle = tokio::spawn(consume_output(
                Arc::clone(&self.shared),
                stdout,
                process.cancel_token(),
                generation,
            ));
            process.attach_reader(handle);
        }
        *slot = Some(process);
        true
    }

    async fn stop_locked(&self, slot: &mut Option<ScriptProcess>) -> bool {
        {
            let mut state = self.shared.state.write().await;
            state.settings.enabled = false;
            state.monitor = if slot.is_some() {
                MonitorState::Stopping
            } else {
                MonitorState::Stopped
            };
        }

        let mut stopped_cleanly = true;
        if let Some(process) = slot.take() {
            let pid = process.id();
            match process.shutdown(self.config.stop_timeout()).await {
                Ok(status) => tracing::debug!(pid, %status, "Monitoring script exited"),
                Err(e) => {
                    tracing::error!(pid, error = %e, "Failed to stop monitoring script");
                    stopped_cleanly = false;
                }
            }
        }

        self.shared.state.write().await.monitor = MonitorState::Stopped;
        tracing::info!("Wi-Fi monitoring script stopped");
        self.shared
            .sink
            .emit(SupervisorEvent::WifiStatusChanged { monitoring: false });
        stopped_cleanly
    }

    fn launch(&self, settings: &Settings) -> Result<ScriptProcess, SupervisorError> {
        let script = ConfiguredScript::prepare(
            &self.config.script_path,
            settings,
            self.config.temp_dir.as_deref(),
        )?;
        tracing::debug!(path = %script.path().display(), "Prepared configured script");
        ScriptProcess::spawn(&self.config.interpreter, script, settings)
    }

    fn ensure_script_executable(&self) {
        let path = &self.config.script_path;
        if !path.exists() {
            tracing::error!(path = %path.display(), "Monitoring script not found");
            return;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            {
                tracing::warn!(path = %path.display(), error = %e, "Failed to mark script executable");
            }
        }
    }
}

/// Read script output line by line until end of stream, cancellation, or
/// until this run is no longer the running one.
///
/// Lines are decoded lossily; bytes that are not UTF-8 never end the run.
async fn consume_output(
    shared: Arc<Shared>,
    stdout: ChildStdout,
    cancel: CancellationToken,
    generation: u64,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = tokio::select! {
            _ = cancel.cancelled() => return,
            read = reader.read_until(b'\n', &mut buf) => read,
        };
        match read {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if !shared.handle_line(line.trim(), generation).await {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Error reading script output");
                break;
            }
        }
    }
    shared.finish_run(generation).await;
}

impl Shared {
    /// Apply one output line. Returns `false` once the run is no longer current.
    async fn handle_line(&self, line: &str, generation: u64) -> bool {
        let parsed = parse_line(line);
        let event = {
            let mut state = self.state.write().await;
            if state.generation != generation || state.monitor != MonitorState::Running {
                return false;
            }
            state.apply_line(parsed, chrono::Utc::now().timestamp())
        };

        match parsed {
            ScriptLine::Unrecognized => tracing::info!(line, "Script output"),
            ScriptLine::Malformed => {
                tracing::debug!(line, "Script output without latency value, ignored")
            }
            _ => tracing::debug!(line, "Script output"),
        }

        if let Some(event) = event {
            self.sink.emit(event);
        }
        true
    }

    /// Output ended: if this run is still the active one the child exited on
    /// its own, so flip to stopped and tell the host.
    async fn finish_run(&self, generation: u64) {
        let ended = {
            let mut state = self.state.write().await;
            if state.generation == generation && state.monitor.is_active() {
                state.monitor = MonitorState::Stopped;
                true
            } else {
                false
            }
        };
        if ended {
            tracing::warn!(generation, "Monitoring script exited unexpectedly");
            self.sink
                .emit(SupervisorEvent::WifiStatusChanged { monitoring: false });
        }
    }
}
