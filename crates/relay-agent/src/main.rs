//! # relayd
//!
//! Relay server binary: loads settings, installs logging and metrics, and
//! serves `/connect` until Ctrl-C or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::logging::init_subscriber;
use relay_server::{RelayConfig, RelayServer, ServerConfig};
use relay_settings::RelaySettings;

/// Real-time WebSocket message relay.
#[derive(Parser, Debug)]
#[command(name = "relayd", about = "Real-time WebSocket message relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `relay_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn settings(&self) -> Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(relay_settings::settings_path);
        let mut settings = relay_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }

        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }
}

/// Resolve when the process is asked to stop.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("Failed to listen for ctrl-c")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    init_subscriber(&settings.logging.level, settings.logging.format);

    let mut server = RelayServer::new(ServerConfig::from(&settings), RelayConfig::from(&settings));
    match relay_server::metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => tracing::warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        handshake_timeout_ms = settings.relay.handshake_timeout_ms,
        heartbeat_interval_ms = settings.relay.heartbeat_interval_ms,
        "relay listening on ws://{addr}/connect"
    );

    shutdown_signal().await?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(vec![handle], Some(server.config().shutdown_timeout))
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_file(json: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, json).unwrap();
        (dir, path)
    }

    #[test]
    fn cli_defaults_are_unset() {
        let cli = Cli::parse_from(["relayd"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_custom_port() {
        let cli = Cli::parse_from(["relayd", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["relayd", "--port", "99999"]).is_err());
    }

    #[test]
    fn flags_override_file() {
        let (_dir, path) = settings_file(r#"{"server": {"host": "10.0.0.1", "port": 9100}}"#);
        let cli = Cli::parse_from([
            "relayd",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9200",
            "--log-level",
            "debug",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.server.port, 9200);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::parse_from(["relayd", "--config", path.to_str().unwrap()]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.relay.handshake_timeout_ms, 100);
    }

    #[test]
    fn invalid_settings_rejected() {
        let (_dir, path) = settings_file(r#"{"relay": {"heartbeatIntervalMs": 0}}"#);
        let cli = Cli::parse_from(["relayd", "--config", path.to_str().unwrap()]);
        let err = cli.settings().unwrap_err();
        assert!(format!("{err:#}").contains("heartbeatIntervalMs"));
    }

    #[test]
    fn unparseable_settings_rejected() {
        let (_dir, path) = settings_file("{ not json");
        let cli = Cli::parse_from(["relayd", "--config", path.to_str().unwrap()]);
        assert!(cli.settings().is_err());
    }

    #[tokio::test]
    async fn server_starts_and_stops() {
        let settings = RelaySettings::default();
        let server = RelayServer::new(
            ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
                ..ServerConfig::from(&settings)
            },
            RelayConfig::from(&settings),
        );
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server
            .shutdown()
            .graceful_shutdown(vec![handle], Some(std::time::Duration::from_secs(5)))
            .await;
        assert!(server.shutdown().is_shutting_down());
    }
}
