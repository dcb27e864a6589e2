//! Prometheus metrics for tap-proxy.
//!
//! Tracks forwarded requests, collector calls and certificate provisioning.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use tracing::error;

lazy_static! {
    /// Total number of proxied requests
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tap_requests_total",
        "Total number of requests forwarded by the proxy",
        &["method", "mode", "status"]  // mode: buffered|streaming|rejected|error
    )
    .unwrap();

    /// Origin request duration
    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tap_upstream_request_duration_ms",
        "Time until the origin response headers arrived",
        &["method"],
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// Collector calls by kind and outcome
    pub static ref COLLECTOR_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "tap_collector_calls_total",
        "Total number of collector calls",
        &["kind", "result"]  // kind: mirror|log, result: success|error|timeout|dropped
    )
    .unwrap();

    /// Certificate fetches from the signing service
    pub static ref CERTIFICATE_FETCHES_TOTAL: CounterVec = register_counter_vec!(
        "tap_certificate_fetches_total",
        "Total number of certificates requested from the signing service",
        &["result"]  // result: success|error
    )
    .unwrap();

    /// Management API rule updates
    pub static ref RULE_UPDATES_TOTAL: CounterVec = register_counter_vec!(
        "tap_rule_updates_total",
        "Total number of rule upserts",
        &["result"]  // result: inserted|replaced|rejected
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(method: &str, mode: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[method, mode, &status.to_string()])
        .inc();
}

pub fn record_upstream_duration(method: &str, duration_ms: f64) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method])
        .observe(duration_ms);
}

pub fn record_collector_call(kind: &str, result: &str) {
    COLLECTOR_CALLS_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn record_certificate_fetch(success: bool) {
    let result = if success { "success" } else { "error" };
    CERTIFICATE_FETCHES_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_rule_update(result: &str) {
    RULE_UPDATES_TOTAL.with_label_values(&[result]).inc();
}
