//! Notifications pushed to the host UI.

use super::state::LastStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Reason attached to every `wifi_restarted` notification.
pub const RESTART_REASON: &str = "High latency detected";

/// Event emitted by the supervisor.
///
/// Serializes as `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// Monitoring started or stopped
    WifiStatusChanged { monitoring: bool },
    /// A ping result was parsed from the script output
    PingResult(LastStatus),
    /// The script cycled the Wi-Fi radio
    WifiRestarted { count: u64, reason: String },
}

impl SupervisorEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorEvent::WifiStatusChanged { .. } => "wifi_status_changed",
            SupervisorEvent::PingResult(_) => "ping_result",
            SupervisorEvent::WifiRestarted { .. } => "wifi_restarted",
        }
    }
}

/// Fire-and-forget channel towards the host.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SupervisorEvent);
}

impl EventSink for broadcast::Sender<SupervisorEvent> {
    fn emit(&self, event: SupervisorEvent) {
        tracing::debug!(event = event.name(), "Emitting event");
        // Ignore error if no receivers are listening
        let _ = self.send(event);
    }
}
