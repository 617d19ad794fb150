//! Prometheus metrics for the Tannoy server.
//!
//! Counters are recorded inline by the handlers; the document-count gauges
//! are refreshed on health checks. All names live in [`names`] so dashboards
//! have one place to look.

use anyhow::Result;
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const OPERATIONS_TOTAL: &str = "tannoy_operations_total";
    pub const OPERATION_ERRORS_TOTAL: &str = "tannoy_operation_errors_total";
    pub const PUSHES_TOTAL: &str = "tannoy_pushes_total";
    pub const CHANNELS_ACTIVE: &str = "tannoy_channels_active";
    pub const PLAYERS_ACTIVE: &str = "tannoy_players_active";
}

/// Register descriptions for every exported metric.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::OPERATIONS_TOTAL,
        "Total number of channel operations served"
    );
    metrics::describe_counter!(
        names::OPERATION_ERRORS_TOTAL,
        "Total number of channel operations that failed"
    );
    metrics::describe_counter!(
        names::PUSHES_TOTAL,
        "Total number of pushes accepted, by persistence"
    );
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Current number of channel documents");
    metrics::describe_gauge!(
        names::PLAYERS_ACTIVE,
        "Current number of player membership documents"
    );

    info!("Metrics initialized");
}

/// Install the Prometheus recorder with an HTTP scrape endpoint.
///
/// # Errors
///
/// Returns an error if the recorder or its listener cannot be set up.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a served operation.
pub fn record_operation(op: &'static str) {
    counter!(names::OPERATIONS_TOTAL, "op" => op).increment(1);
}

/// Record a failed operation.
pub fn record_operation_error(op: &'static str) {
    counter!(names::OPERATION_ERRORS_TOTAL, "op" => op).increment(1);
}

/// Record an accepted push.
pub fn record_push(persistent: bool) {
    let kind = if persistent { "persistent" } else { "transient" };
    counter!(names::PUSHES_TOTAL, "kind" => kind).increment(1);
}

/// Update the document-count gauges.
pub fn set_document_counts(channels: usize, players: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(channels as f64);
    gauge!(names::PLAYERS_ACTIVE).set(players as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_do_not_panic() {
        // No recorder installed; calls must be harmless no-ops.
        record_operation("join");
        record_operation_error("push");
        record_push(true);
        set_document_counts(3, 5);
    }
}
