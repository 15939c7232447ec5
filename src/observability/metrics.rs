//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fetch_requests_total` (counter): terminal completions by governor, outcome
//! - `fetch_attempts_total` (counter): attempts by governor, status
//! - `fetch_retries_total` (counter): re-scheduled attempts by governor
//! - `fetch_request_duration_seconds` (histogram): submission to completion
//! - `governor_rate` (gauge): current target rate
//! - `governor_in_flight` (gauge): permits held
//! - `governor_throttle_floor_total` (counter): floor alerts
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_completion(governor: &str, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "fetch_requests_total",
        "governor" => governor.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("fetch_request_duration_seconds", "governor" => governor.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_attempt(governor: &str, status: Option<u16>) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    metrics::counter!(
        "fetch_attempts_total",
        "governor" => governor.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_retry(governor: &str) {
    metrics::counter!("fetch_retries_total", "governor" => governor.to_string()).increment(1);
}

pub fn record_rate(governor: &str, rate: f64) {
    metrics::gauge!("governor_rate", "governor" => governor.to_string()).set(rate);
}

pub fn record_in_flight(governor: &str, in_flight: usize) {
    metrics::gauge!("governor_in_flight", "governor" => governor.to_string()).set(in_flight as f64);
}

pub fn record_throttle_floor(governor: &str) {
    metrics::counter!("governor_throttle_floor_total", "governor" => governor.to_string())
        .increment(1);
}
