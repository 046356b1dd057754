//! Supervisor state and the transitions driven by script output.

use super::events::{SupervisorEvent, RESTART_REASON};
use super::parser::ScriptLine;
use super::settings::Settings;
use serde::{Deserialize, Serialize};

/// Lifecycle of the monitoring child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl MonitorState {
    /// Starting or running; `start` is a no-op in these states.
    pub fn is_active(self) -> bool {
        matches!(self, MonitorState::Starting | MonitorState::Running)
    }
}

/// Classification of the latest ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PingStatus {
    Ok,
    High,
    Failed,
    #[default]
    Unknown,
}

/// Most recent ping result. Failed pings carry a latency of `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LastStatus {
    pub latency: f64,
    pub status: PingStatus,
    /// Unix seconds
    pub timestamp: i64,
}

/// Snapshot returned by `get_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub is_monitoring: bool,
    pub last_ping: LastStatus,
    pub restart_count: u64,
    pub settings: Settings,
}

/// Everything the supervisor tracks besides the child handle.
#[derive(Debug, Clone, Default)]
pub struct SupervisorState {
    pub monitor: MonitorState,
    pub settings: Settings,
    pub last_ping: LastStatus,
    pub restart_count: u64,
    /// Incremented for every child run
    pub generation: u64,
}

impl SupervisorState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            is_monitoring: self.monitor.is_active(),
            last_ping: self.last_ping,
            restart_count: self.restart_count,
            settings: self.settings.clone(),
        }
    }

    /// Apply a parsed output line observed at `now` (unix seconds).
    /// Returns the event to emit, if any.
    pub fn apply_line(&mut self, line: ScriptLine, now: i64) -> Option<SupervisorEvent> {
        match line {
            ScriptLine::PingOk { latency_ms } => {
                Some(self.record_ping(latency_ms, PingStatus::Ok, now))
            }
            ScriptLine::HighLatency { latency_ms } => {
                Some(self.record_ping(latency_ms, PingStatus::High, now))
            }
            ScriptLine::PingFailed => Some(self.record_ping(-1.0, PingStatus::Failed, now)),
            ScriptLine::WifiRestart => {
                self.restart_count += 1;
                Some(SupervisorEvent::WifiRestarted {
                    count: self.restart_count,
                    reason: RESTART_REASON.to_string(),
                })
            }
            ScriptLine::Malformed | ScriptLine::Unrecognized => None,
        }
    }

    fn record_ping(&mut self, latency: f64, status: PingStatus, now: i64) -> SupervisorEvent {
        self.last_ping = LastStatus {
            latency,
            status,
            timestamp: now,
        };
        SupervisorEvent::PingResult(self.last_ping)
    }
}
