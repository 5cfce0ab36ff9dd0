//! Metrics collection and exposition.
//!
//! # Metrics
//! - `abuse_failures_total` (counter): client errors fed into the tracker
//! - `abuse_blocks_total` (counter): blocks by origin (automatic, manual)
//! - `abuse_unblocks_total` (counter): releases by reason (expired, manual)
//! - `abuse_gate_rejections_total` (counter): requests refused by the early gate
//! - `abuse_capacity_evictions_total` (counter): keys evicted at the tracked-key cap
//! - `abuse_blocked_keys` (gauge): current block count
//! - `abuse_tracked_keys` (gauge): keys with a failure history
//! - `proxy_requests_total` (counter): forwarded requests by method, status
//! - `proxy_request_duration_seconds` (histogram): upstream latency
//!
//! Without an installed recorder every call is a no-op, which keeps unit
//! tests free of global setup.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_failure() {
    counter!("abuse_failures_total").increment(1);
}

pub fn record_block(origin: &'static str) {
    counter!("abuse_blocks_total", "origin" => origin).increment(1);
}

pub fn record_unblock(reason: &'static str) {
    counter!("abuse_unblocks_total", "reason" => reason).increment(1);
}

pub fn record_gate_rejection() {
    counter!("abuse_gate_rejections_total").increment(1);
}

pub fn record_capacity_evictions(count: usize) {
    counter!("abuse_capacity_evictions_total").increment(count as u64);
}

pub fn set_blocked_keys(count: usize) {
    gauge!("abuse_blocked_keys").set(count as f64);
}

pub fn set_tracked_keys(count: usize) {
    gauge!("abuse_tracked_keys").set(count as f64);
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    counter!("proxy_requests_total", "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string(), "status" => status)
        .record(start.elapsed().as_secs_f64());
}
