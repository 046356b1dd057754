//! Shared test utilities for LotusWiFi integration tests.
//!
//! Provides script fixtures, a sandboxed supervisor config and helpers for
//! waiting on supervisor events.

#![allow(dead_code)]

use lotuswifi::supervisor::{Supervisor, SupervisorConfig, SupervisorEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// =============================================================================
// Well-Known Test Constants
// =============================================================================

/// Upper bound on how long any single event may take to show up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Declarations the supervisor rewrites, as the shipped script has them.
pub const SCRIPT_HEADER: &str = "#!/bin/bash\nMAX_LATENCY=100\nCHECK_INTERVAL=10\nPING_HOST=\"8.8.8.8\"\n";

// =============================================================================
// Script Fixtures
// =============================================================================

/// Write a monitoring script made of [`SCRIPT_HEADER`] followed by `body`.
pub fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("wifitoggler");
    std::fs::write(&path, format!("{SCRIPT_HEADER}{body}\n")).unwrap();
    path
}

/// Script that reports one good ping and then idles.
pub fn idle_script(dir: &Path) -> PathBuf {
    write_script(dir, "echo \"Ping OK (42ms)\"\nsleep 30")
}

/// Script that records its effective settings in `out` and then idles.
pub fn recording_script(dir: &Path, out: &Path) -> PathBuf {
    write_script(
        dir,
        &format!(
            "echo \"$PING_HOST $MAX_LATENCY $CHECK_INTERVAL\" > \"{}\"\nsleep 30",
            out.display()
        ),
    )
}

// =============================================================================
// Supervisor Builders
// =============================================================================

/// Config that keeps settings and temp copies inside `dir`.
pub fn test_config(dir: &Path, script_path: PathBuf) -> SupervisorConfig {
    let temp_dir = dir.join("tmp");
    std::fs::create_dir_all(&temp_dir).unwrap();
    SupervisorConfig {
        script_path,
        settings_dir: Some(dir.join("settings")),
        temp_dir: Some(temp_dir),
        stop_timeout_seconds: 2,
        ..Default::default()
    }
}

/// Supervisor wired to a broadcast channel, with the receiving end.
pub fn make_supervisor(
    config: SupervisorConfig,
) -> (Supervisor, broadcast::Receiver<SupervisorEvent>) {
    let (tx, rx) = broadcast::channel(64);
    (Supervisor::new(config, Arc::new(tx)), rx)
}

/// Names of configured script copies currently in `dir`.
pub fn temp_scripts(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(lotuswifi::supervisor::script::TEMP_PREFIX))
        .collect()
}

// =============================================================================
// Waiting
// =============================================================================

/// Wait for the next event matching `pred`, skipping others.
pub async fn next_matching<F>(
    rx: &mut broadcast::Receiver<SupervisorEvent>,
    mut pred: F,
) -> SupervisorEvent
where
    F: FnMut(&SupervisorEvent) -> bool,
{
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll `check` until it holds or [`EVENT_TIMEOUT`] passes.
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Whether a process with `pid` still exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}
