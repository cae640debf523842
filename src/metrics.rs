//! Prometheus metrics.
//!
//! # Available Metrics
//!
//! - `response_time_milliseconds` (histogram) - Time to produce each response
//! - `processed_requests_total` (counter, label `status_code`) - Responses by status
//! - `rate_limited_requests_total` (counter) - Requests rejected with 429
//! - `rate_limiter_clients` (gauge) - Clients tracked by the limiter registry
//!
//! Recording functions are no-ops until [`init_metrics`] installs a recorder.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const RESPONSE_TIME_MILLISECONDS: &str = "response_time_milliseconds";
    pub const PROCESSED_REQUESTS_TOTAL: &str = "processed_requests_total";
    pub const RATE_LIMITED_REQUESTS_TOTAL: &str = "rate_limited_requests_total";
    pub const RATE_LIMITER_CLIENTS: &str = "rate_limiter_clients";
}

const RESPONSE_TIME_BUCKETS: [f64; 10] = [0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 150.0, 200.0];

/// Install the Prometheus exporter and describe all metrics.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .set_buckets_for_metric(
            Matcher::Full(names::RESPONSE_TIME_MILLISECONDS.to_string()),
            &RESPONSE_TIME_BUCKETS,
        )
        .map_err(|e| format!("Invalid histogram buckets: {e}"))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_histogram!(
        names::RESPONSE_TIME_MILLISECONDS,
        "The histogram of response time in milliseconds"
    );
    describe_counter!(
        names::PROCESSED_REQUESTS_TOTAL,
        "The total count of processed requests"
    );
    describe_counter!(
        names::RATE_LIMITED_REQUESTS_TOTAL,
        "Requests rejected by the per-client rate limiter"
    );
    describe_gauge!(
        names::RATE_LIMITER_CLIENTS,
        "Number of clients currently tracked by the rate limiter"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record one completed response.
pub fn record_response(status_code: u16, elapsed_ms: f64) {
    histogram!(names::RESPONSE_TIME_MILLISECONDS).record(elapsed_ms);
    counter!(names::PROCESSED_REQUESTS_TOTAL, "status_code" => status_code.to_string())
        .increment(1);
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_REQUESTS_TOTAL).increment(1);
}

pub fn set_tracked_clients(count: usize) {
    gauge!(names::RATE_LIMITER_CLIENTS).set(count as f64);
}
