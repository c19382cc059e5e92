//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): chat requests by status, backend
//! - `gateway_request_duration_seconds` (histogram): time to response headers
//! - `gateway_active_connections` (gauge): in-flight requests per backend
//! - `gateway_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `gateway_catalog_refreshes_total` (counter)
//! - `gateway_catalog_models` (gauge): unique models after the last refresh
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Start the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(status: u16, backend: &str, start: Instant) {
    let status = status.to_string();
    counter!("gateway_requests_total", "status" => status.clone(), "backend" => backend.to_string())
        .increment(1);
    histogram!("gateway_request_duration_seconds", "status" => status, "backend" => backend.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(backend: &str, count: usize) {
    gauge!("gateway_active_connections", "backend" => backend.to_string()).set(count as f64);
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("gateway_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_catalog_refresh(models: usize) {
    counter!("gateway_catalog_refreshes_total").increment(1);
    gauge!("gateway_catalog_models").set(models as f64);
}
