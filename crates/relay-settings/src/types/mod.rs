//! Settings types.

mod server;

pub use server::{LoggingSettings, ProtocolSettings, ServerSettings};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network listener settings.
    pub server: ServerSettings,
    /// Handshake, heartbeat, and routing behavior.
    pub relay: ProtocolSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("relay.handshakeTimeoutMs", self.relay.handshake_timeout_ms),
            ("relay.heartbeatIntervalMs", self.relay.heartbeat_interval_ms),
            ("relay.writeTimeoutMs", self.relay.write_timeout_ms),
            ("server.requestTimeoutMs", self.server.request_timeout_ms),
            ("server.shutdownTimeoutMs", self.server.shutdown_timeout_ms),
        ];
        for (key, value) in non_zero {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{key} must be > 0")));
            }
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        if self.server.max_message_size < 64 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 64 bytes".into(),
            ));
        }
        if self.relay.max_consecutive_read_errors == 0 {
            return Err(SettingsError::InvalidValue(
                "relay.maxConsecutiveReadErrors must be > 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn zero_handshake_timeout_rejected() {
        let mut settings = RelaySettings::default();
        settings.relay.handshake_timeout_ms = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::InvalidValue(msg)) if msg.contains("handshakeTimeoutMs")
        );
    }

    #[test]
    fn zero_max_connections_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.max_connections = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn tiny_message_size_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.max_message_size = 8;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_read_error_budget_rejected() {
        let mut settings = RelaySettings::default();
        settings.relay.max_consecutive_read_errors = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(value["relay"].get("handshakeTimeoutMs").is_some());
        assert!(value["server"].get("maxConnections").is_some());
        assert_eq!(value["logging"]["format"], "compact");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"relay": {"writeTimeoutMs": 250}}"#).unwrap();
        assert_eq!(settings.relay.write_timeout_ms, 250);
        assert_eq!(settings.relay.handshake_timeout_ms, 100);
        assert_eq!(settings.server.port, 9000);
    }
}
