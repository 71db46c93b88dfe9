//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter): accepted client sockets
//! - `proxy_requests_total` (counter): finished requests by outcome
//! - `proxy_request_duration_seconds` (histogram): time from admission to close
//! - `proxy_cache_lookups_total` (counter): lookups by result (hit, miss)
//! - `proxy_cache_evictions_total` (counter): LRU evictions
//! - `proxy_cache_entries` / `proxy_cache_bytes` (gauges): cache occupancy
//! - `proxy_admission_in_flight` (gauge): requests holding an admission slot
//! - `proxy_upstream_errors_total` (counter): origin failures by kind
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exporter only runs when enabled in config

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_connection_accepted() {
    counter!("proxy_connections_accepted_total").increment(1);
}

/// Record a finished request and its latency.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("proxy_requests_total", "outcome" => outcome).increment(1);
    histogram!("proxy_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_evictions(count: usize) {
    if count > 0 {
        counter!("proxy_cache_evictions_total").increment(count as u64);
    }
}

pub fn record_cache_size(entries: usize, bytes: usize) {
    gauge!("proxy_cache_entries").set(entries as f64);
    gauge!("proxy_cache_bytes").set(bytes as f64);
}

pub fn record_admission_in_flight(in_flight: usize) {
    gauge!("proxy_admission_in_flight").set(in_flight as f64);
}

pub fn record_upstream_error(kind: &'static str) {
    counter!("proxy_upstream_errors_total", "kind" => kind).increment(1);
}
