//! Prometheus metrics for the cache.
//!
//! Recording goes through the `metrics` facade, so every call here is
//! fire-and-forget and a no-op until a recorder is installed. Applications
//! that already install their own recorder get these series for free;
//! [`init_metrics`] installs a Prometheus recorder for everyone else.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_EVICTIONS_TOTAL: &str = "cache_evictions_total";
    pub const CACHE_OPERATION_DURATION_SECONDS: &str = "cache_operation_duration_seconds";
    pub const CACHE_ENTRIES: &str = "cache_entries";
    pub const CACHE_BYTES: &str = "cache_bytes";
    pub const CACHE_BREAKER_STATE: &str = "cache_breaker_state";
}

/// Initialize the Prometheus metrics exporter.
///
/// Returns `true` if initialization succeeded, `false` if already initialized
/// or another recorder is installed.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Record a cache hit.
pub fn record_cache_hit(tier: &'static str, namespace: &str) {
    counter!(
        names::CACHE_HITS_TOTAL,
        "tier" => tier,
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(tier: &'static str, namespace: &str) {
    counter!(
        names::CACHE_MISSES_TOTAL,
        "tier" => tier,
        "namespace" => namespace.to_string()
    )
    .increment(1);
}

/// Record a failed cache operation.
pub fn record_cache_error(tier: &'static str, namespace: &str, kind: &'static str) {
    counter!(
        names::CACHE_ERRORS_TOTAL,
        "tier" => tier,
        "namespace" => namespace.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Record the latency of a single tier operation.
pub fn record_operation_duration(
    tier: &'static str,
    operation: &'static str,
    namespace: &str,
    duration: Duration,
) {
    histogram!(
        names::CACHE_OPERATION_DURATION_SECONDS,
        "tier" => tier,
        "operation" => operation,
        "namespace" => namespace.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record entries evicted from the local tier to stay within budget.
pub fn record_evictions(count: u64) {
    counter!(names::CACHE_EVICTIONS_TOTAL, "tier" => "local").increment(count);
}

/// Set the size of the local tier.
pub fn set_cache_size(entries: usize, bytes: usize) {
    gauge!(names::CACHE_ENTRIES, "tier" => "local").set(entries as f64);
    gauge!(names::CACHE_BYTES, "tier" => "local").set(bytes as f64);
}

/// Set the circuit breaker state (0 = healthy, 1 = probing, 2 = cooling down).
pub fn set_breaker_state(value: u8) {
    gauge!(names::CACHE_BREAKER_STATE).set(value as f64);
}
