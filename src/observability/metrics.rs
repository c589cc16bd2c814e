//! Metrics collection and exposition.
//!
//! # Metrics
//! - `engine_service_running` (gauge): 1=running, 0=stopped, by service
//! - `engine_service_start_failures_total` (counter): by service
//! - `engine_reloads_total` (counter): by service, outcome
//! - `engine_reload_notifications_total` (counter): by section
//! - `engine_datadb_swaps_total` (counter): by db_type
//!
//! # Design Decisions
//! - Labels stay low-cardinality (service and section names only)
//! - The Prometheus endpoint is optional and installed by the binary

use std::net::SocketAddr;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Outcome label of a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    Unchanged,
    Failed,
}

impl ReloadOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            ReloadOutcome::Applied => "applied",
            ReloadOutcome::Unchanged => "unchanged",
            ReloadOutcome::Failed => "failed",
        }
    }
}

/// Install the Prometheus recorder with an HTTP scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_service_state(service: &str, running: bool) {
    metrics::gauge!("engine_service_running", "service" => service.to_string())
        .set(if running { 1.0 } else { 0.0 });
}

pub fn record_start_failure(service: &str) {
    metrics::counter!("engine_service_start_failures_total", "service" => service.to_string())
        .increment(1);
}

pub fn record_reload(service: &str, outcome: ReloadOutcome) {
    metrics::counter!(
        "engine_reloads_total",
        "service" => service.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_reload_notification(section: &str) {
    metrics::counter!("engine_reload_notifications_total", "section" => section.to_string())
        .increment(1);
}

pub fn record_connection_swap(db_type: &str) {
    metrics::counter!("engine_datadb_swaps_total", "db_type" => db_type.to_string()).increment(1);
}
