//! Server and protocol configuration.

use std::time::Duration;

use relay_settings::RelaySettings;
use serde::{Deserialize, Serialize};

/// Network listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrently registered connections.
    pub max_connections: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Timeout applied to plain HTTP requests.
    pub request_timeout: Duration,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1024,
            max_message_size: 64 * 1024,
            request_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(20),
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            request_timeout: server.request_timeout(),
            shutdown_timeout: server.shutdown_timeout(),
        }
    }
}

/// Handshake, routing, and heartbeat behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// How long to wait for the identity payload after `HELLO`.
    pub handshake_timeout: Duration,
    /// Interval between heartbeat sweeps.
    pub heartbeat_interval: Duration,
    /// Bound on one routed write or heartbeat probe.
    pub write_timeout: Duration,
    /// Consecutive transient read failures before a session ends.
    pub max_consecutive_read_errors: u32,
    /// Reject messages whose `fromID` differs from the session's identity.
    pub enforce_sender_identity: bool,
    /// Report routing failures back to the sender.
    pub notify_route_errors: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(100),
            heartbeat_interval: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            max_consecutive_read_errors: 5,
            enforce_sender_identity: true,
            notify_route_errors: true,
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        let relay = &settings.relay;
        Self {
            handshake_timeout: relay.handshake_timeout(),
            heartbeat_interval: relay.heartbeat_interval(),
            write_timeout: relay.write_timeout(),
            max_consecutive_read_errors: relay.max_consecutive_read_errors,
            enforce_sender_identity: relay.enforce_sender_identity,
            notify_route_errors: relay.notify_route_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_server_binds_loopback_ephemeral() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn relay_defaults_match_settings_defaults() {
        let from_settings = RelayConfig::from(&RelaySettings::default());
        let defaults = RelayConfig::default();
        assert_eq!(from_settings.handshake_timeout, defaults.handshake_timeout);
        assert_eq!(from_settings.heartbeat_interval, defaults.heartbeat_interval);
        assert_eq!(from_settings.write_timeout, defaults.write_timeout);
        assert_eq!(
            from_settings.max_consecutive_read_errors,
            defaults.max_consecutive_read_errors
        );
        assert!(from_settings.enforce_sender_identity);
        assert!(from_settings.notify_route_errors);
    }

    #[test]
    fn server_from_settings() {
        let mut settings = RelaySettings::default();
        settings.server.port = 9100;
        settings.server.max_connections = 3;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_connections, 3);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(20));
    }
}
