//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_upgrades_total` (counter): upgrade handshakes by outcome
//! - `gateway_active_connections` (gauge): current connection count
//!
//! Recording is a no-op until a recorder is installed, so library users and
//! tests pay nothing when the exporter is disabled.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request/response cycle.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Upgrade handshake outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    Accepted,
    Rejected,
    Failed,
}

impl UpgradeOutcome {
    fn as_str(self) -> &'static str {
        match self {
            UpgradeOutcome::Accepted => "accepted",
            UpgradeOutcome::Rejected => "rejected",
            UpgradeOutcome::Failed => "failed",
        }
    }
}

pub fn record_upgrade(outcome: UpgradeOutcome) {
    metrics::counter!("gateway_upgrades_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn set_active_connections(count: u64) {
    metrics::gauge!("gateway_active_connections").set(count as f64);
}
