// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_histogram, histogram};

/// Initializes the descriptions for all the metrics in the application.
/// This should be called once at startup.
pub fn describe_metrics() {
    describe_counter!(
        "rpc_requests_total",
        Unit::Count,
        "Upstream JSON-RPC calls, labeled by host and method."
    );
    describe_counter!("rpc_429_total", Unit::Count, "Rate-limit responses, labeled by host.");
    describe_counter!(
        "rpc_unhealthy_total",
        Unit::Count,
        "Endpoints that failed the pre-request liveness probe."
    );
    describe_counter!(
        "chunk_rate_limit_backoffs_total",
        Unit::Count,
        "Fixed back-off sleeps taken by the chunk fetcher."
    );
    describe_counter!(
        "chunk_failovers_total",
        Unit::Count,
        "Times a chunk moved on to the next endpoint in its order."
    );
    describe_counter!(
        "chunk_exhausted_total",
        Unit::Count,
        "Chunks that failed on every endpoint, labeled by event."
    );
    describe_counter!(
        "tx_lookups_skipped_total",
        Unit::Count,
        "Transactions dropped from sender attribution after a failed lookup."
    );
    describe_histogram!(
        "rpc_latency_seconds",
        Unit::Seconds,
        "Latency of upstream JSON-RPC calls."
    );
    describe_histogram!(
        "chunk_fetch_duration_seconds",
        Unit::Seconds,
        "Wall time to fetch one chunk, including retries and failovers."
    );
}

/// Serves the Prometheus scrape endpoint on `addr`.
#[cfg(feature = "observability")]
pub fn install_prometheus_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

// --- Helper functions to update metrics ---

pub fn record_rpc_request(host: &str, method: &'static str, duration: std::time::Duration) {
    counter!("rpc_requests_total", 1, "host" => host.to_string(), "method" => method);
    histogram!("rpc_latency_seconds", duration.as_secs_f64(), "method" => method);
}

pub fn increment_rpc_429(host: &str) {
    counter!("rpc_429_total", 1, "host" => host.to_string());
}

pub fn increment_rpc_unhealthy(host: &str) {
    counter!("rpc_unhealthy_total", 1, "host" => host.to_string());
}

pub fn increment_chunk_backoff(host: &str) {
    counter!("chunk_rate_limit_backoffs_total", 1, "host" => host.to_string());
}

pub fn increment_chunk_failover(host: &str) {
    counter!("chunk_failovers_total", 1, "host" => host.to_string());
}

pub fn increment_chunk_exhausted(event: &str) {
    counter!("chunk_exhausted_total", 1, "event" => event.to_string());
}

pub fn record_chunk_fetch(event: &str, duration: std::time::Duration) {
    histogram!("chunk_fetch_duration_seconds", duration.as_secs_f64(), "event" => event.to_string());
}

pub fn increment_tx_lookups_skipped(count: u64) {
    counter!("tx_lookups_skipped_total", count);
}
