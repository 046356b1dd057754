//! LotusWiFi - supervisor for the Wi-Fi latency monitoring script
//!
//! This library runs the `wifitoggler` shell script with user settings,
//! turns its output into structured status updates and restart counts, and
//! exposes start/stop/settings operations to a plugin host over a
//! line-delimited JSON bridge.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod logging;
pub mod supervisor;
