//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, deciding stage
//! - `proxy_request_duration_seconds` (histogram): pipeline latency
//! - `proxy_upstream_requests_total` / `proxy_upstream_duration_seconds`: backend calls
//! - `proxy_token_endpoint_duration_seconds` (histogram): UAA token calls
//! - `proxy_token_refresh_total` (counter): refresh outcomes
//! - `proxy_callbacks_total` (counter): callback outcomes
//! - `proxy_websocket_tunnels_active` (gauge): open websocket tunnels
//! - `proxy_sessions_purged_total` (counter): expired session records removed
//!
//! Recording is a no-op until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a request answered by the pipeline.
pub fn record_request(method: &str, status: u16, stage: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("stage", stage.to_string()),
    ];
    counter!("proxy_requests_total", &labels).increment(1);
    histogram!("proxy_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_upstream(status: u16, start: Instant) {
    counter!("proxy_upstream_requests_total", "status" => status.to_string()).increment(1);
    histogram!("proxy_upstream_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_token_endpoint(start: Instant) {
    histogram!("proxy_token_endpoint_duration_seconds").record(start.elapsed().as_secs_f64());
}

/// `outcome` is one of "refreshed", "failed", "scope_insufficient".
pub fn record_refresh(outcome: &'static str) {
    counter!("proxy_token_refresh_total", "outcome" => outcome).increment(1);
}

pub fn record_callback(outcome: &str) {
    counter!("proxy_callbacks_total", "outcome" => outcome.to_string()).increment(1);
}

pub fn record_tunnel_opened() {
    counter!("proxy_websocket_tunnels_total").increment(1);
    gauge!("proxy_websocket_tunnels_active").increment(1.0);
}

pub fn record_tunnel_closed() {
    gauge!("proxy_websocket_tunnels_active").decrement(1.0);
}

pub fn record_sessions_purged(count: usize) {
    counter!("proxy_sessions_purged_total").increment(count as u64);
}
