//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// Registered connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Successful handshakes (counter).
pub const HANDSHAKES_TOTAL: &str = "relay_handshakes_total";
/// Failed handshakes (counter, labels: code).
pub const HANDSHAKE_FAILURES_TOTAL: &str = "relay_handshake_failures_total";
/// Messages delivered to a recipient (counter).
pub const MESSAGES_ROUTED_TOTAL: &str = "relay_messages_routed_total";
/// Messages that could not be routed (counter, labels: code).
pub const ROUTE_ERRORS_TOTAL: &str = "relay_route_errors_total";
/// Heartbeat probes sent (counter).
pub const PROBES_TOTAL: &str = "relay_probes_total";
/// Connections evicted after a failed probe (counter).
pub const EVICTIONS_TOTAL: &str = "relay_evictions_total";
/// Sessions ended (counter, labels: reason).
pub const SESSIONS_ENDED_TOTAL: &str = "relay_sessions_ended_total";
/// Upgrade requests refused before the handshake (counter, labels: code).
pub const UPGRADES_REJECTED_TOTAL: &str = "relay_upgrades_rejected_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_recorder_renders() {
        // Build a recorder + handle without a global install.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(MESSAGES_ROUTED_TOTAL).increment(3);
        });
        let output = render(&handle);
        assert!(output.contains("relay_messages_routed_total 3"));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            CONNECTIONS_ACTIVE,
            HANDSHAKES_TOTAL,
            HANDSHAKE_FAILURES_TOTAL,
            MESSAGES_ROUTED_TOTAL,
            ROUTE_ERRORS_TOTAL,
            PROBES_TOTAL,
            EVICTIONS_TOTAL,
            SESSIONS_ENDED_TOTAL,
            UPGRADES_REJECTED_TOTAL,
        ];
        for name in names {
            assert!(
                name.starts_with("relay_")
                    && name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case with the relay_ prefix"
            );
        }
    }
}
