//! Server, protocol, and logging settings.

use std::time::Duration;

use relay_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Network listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port (`0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Maximum WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Timeout for plain HTTP requests in milliseconds.
    pub request_timeout_ms: u64,
    /// Upper bound on graceful shutdown in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            request_timeout_ms: 10_000,
            shutdown_timeout_ms: 20_000,
        }
    }
}

impl ServerSettings {
    /// Plain HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Graceful shutdown bound.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Handshake, heartbeat, and routing behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProtocolSettings {
    /// How long the server waits for the identity payload after `HELLO`.
    pub handshake_timeout_ms: u64,
    /// Interval between heartbeat sweeps.
    pub heartbeat_interval_ms: u64,
    /// Bound on a single routed write or heartbeat probe.
    pub write_timeout_ms: u64,
    /// Consecutive transient read failures tolerated before a session ends.
    pub max_consecutive_read_errors: u32,
    /// Reject routed messages whose `fromID` is not the session's identity.
    pub enforce_sender_identity: bool,
    /// Send an error frame back to the sender when routing fails.
    pub notify_route_errors: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 100,
            heartbeat_interval_ms: 10_000,
            write_timeout_ms: 5_000,
            max_consecutive_read_errors: 5,
            enforce_sender_identity: true,
            notify_route_errors: true,
        }
    }
}

impl ProtocolSettings {
    /// Handshake identity wait.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Heartbeat sweep interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Per-write bound.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_durations() {
        let p = ProtocolSettings::default();
        assert_eq!(p.handshake_timeout(), Duration::from_millis(100));
        assert_eq!(p.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(p.write_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn server_durations() {
        let s = ServerSettings::default();
        assert_eq!(s.request_timeout(), Duration::from_secs(10));
        assert_eq!(s.shutdown_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn logging_defaults() {
        let l = LoggingSettings::default();
        assert_eq!(l.level, "info");
        assert_eq!(l.format, LogFormat::Compact);
    }
}
