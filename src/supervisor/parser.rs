//! Classification of monitoring script output lines.

use regex::Regex;
use std::sync::LazyLock;

/// Marker printed by the script after a successful ping.
pub const PING_OK_MARKER: &str = "Ping OK";
/// Marker printed when latency exceeds the configured threshold.
pub const HIGH_LATENCY_MARKER: &str = "High latency detected";
/// Marker printed right before the script cycles the Wi-Fi radio.
pub const RESTART_MARKER: &str = "Restarting Wi-Fi";
/// Marker printed when ping produced no reply.
pub const PING_FAILED_MARKER: &str = "Ping failed or timed out";

static PING_OK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Ping OK \((\d+(?:\.\d+)?)ms\)").expect("valid regex"));

static HIGH_LATENCY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"High latency detected \((\d+(?:\.\d+)?)ms\)").expect("valid regex")
});

/// What a single line of script output means to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScriptLine {
    /// Ping succeeded under the threshold
    PingOk { latency_ms: f64 },
    /// Ping succeeded above the threshold
    HighLatency { latency_ms: f64 },
    /// Script is cycling the Wi-Fi radio
    WifiRestart,
    /// Ping failed or timed out
    PingFailed,
    /// A latency marker was present but no number could be extracted
    Malformed,
    /// No marker matched
    Unrecognized,
}

/// Classify one line of output.
///
/// Markers are checked in a fixed order and the first hit wins, so a line
/// containing both `Ping OK` and `Restarting Wi-Fi` counts as a ping.
pub fn parse_line(line: &str) -> ScriptLine {
    if line.contains(PING_OK_MARKER) {
        match extract_latency(&PING_OK_PATTERN, line) {
            Some(latency_ms) => ScriptLine::PingOk { latency_ms },
            None => ScriptLine::Malformed,
        }
    } else if line.contains(HIGH_LATENCY_MARKER) {
        match extract_latency(&HIGH_LATENCY_PATTERN, line) {
            Some(latency_ms) => ScriptLine::HighLatency { latency_ms },
            None => ScriptLine::Malformed,
        }
    } else if line.contains(RESTART_MARKER) {
        ScriptLine::WifiRestart
    } else if line.contains(PING_FAILED_MARKER) {
        ScriptLine::PingFailed
    } else {
        ScriptLine::Unrecognized
    }
}

fn extract_latency(pattern: &Regex, line: &str) -> Option<f64> {
    pattern
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
