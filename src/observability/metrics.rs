//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, backend
//! - `proxy_request_duration_seconds` (histogram): latency distribution
//! - `proxy_active_connections` (gauge): in-flight requests per backend
//! - `proxy_backend_health` (gauge): 1=eligible, 0=not
//! - `proxy_backend_weight` (gauge): current weighted-selection weight
//! - `proxy_breaker_transitions_total` (counter): breaker state changes

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::BreakerState;

/// Install the Prometheus recorder and its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "backend" => backend.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(backend: &str, active: usize) {
    metrics::gauge!("proxy_active_connections", "backend" => backend.to_string())
        .set(active as f64);
}

pub fn record_backend_health(backend: &str, eligible: bool) {
    metrics::gauge!("proxy_backend_health", "backend" => backend.to_string())
        .set(if eligible { 1.0 } else { 0.0 });
}

pub fn record_backend_weight(backend: &str, weight: f64) {
    metrics::gauge!("proxy_backend_weight", "backend" => backend.to_string()).set(weight);
}

pub fn record_breaker_transition(backend: &str, to: BreakerState) {
    metrics::counter!(
        "proxy_breaker_transitions_total",
        "backend" => backend.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
}
