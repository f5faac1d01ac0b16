//! Request metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `conduit_requests_total` | Counter | `type`, `source` | Requests entering the handler |
//! | `conduit_request_duration_seconds` | Histogram | `type`, `source` | Handler latency |
//! | `conduit_requests_succeeded_total` | Counter | `type`, `source` | Successful requests |
//! | `conduit_requests_failed_total` | Counter | `type`, `source`, `code` | Failed requests |
//!
//! The metrics middleware records through the [`MetricsSink`] trait.
//! [`PrometheusMetrics`] forwards to the `metrics` facade (exported by the
//! recorder [`init_metrics`] installs); [`InMemoryMetrics`] keeps samples in
//! memory for assertions.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Counter of requests entering the handler.
    pub const REQUESTS_TOTAL: &str = "conduit_requests_total";
    /// Histogram of handler latency in seconds.
    pub const REQUEST_DURATION: &str = "conduit_request_duration_seconds";
    /// Counter of successful requests.
    pub const REQUESTS_SUCCEEDED: &str = "conduit_requests_succeeded_total";
    /// Counter of failed requests.
    pub const REQUESTS_FAILED: &str = "conduit_requests_failed_total";
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether a recorder is installed at all.
    pub enabled: bool,

    /// Address for the Prometheus scrape listener. Without one, metrics are
    /// only available through [`render_metrics`].
    pub listen_addr: Option<String>,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: None,
            duration_buckets: vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

/// Installs the global Prometheus recorder.
///
/// With a listen address the exporter serves `/metrics` itself and must be
/// called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the address does not parse or a recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    match &config.listen_addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            builder
                .with_http_listener(addr)
                .install()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        }
        None => {
            let handle = builder
                .install_recorder()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let _ = METRICS_HANDLE.set(handle);
        }
    }

    describe_metrics();
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` unless [`init_metrics`] installed a recorder without a
/// listener.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn describe_metrics() {
    describe_counter!(names::REQUESTS_TOTAL, "Requests entering the handler");
    describe_histogram!(
        names::REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Handler latency"
    );
    describe_counter!(names::REQUESTS_SUCCEEDED, "Requests that succeeded");
    describe_counter!(names::REQUESTS_FAILED, "Requests that failed, by error code");
}

/// Destination for per-request metrics.
///
/// Implementations must be cheap and non-blocking; they are called inline on
/// every request.
pub trait MetricsSink: Send + Sync + 'static {
    /// Counts a request entering the handler.
    fn increment_requests(&self, request_type: &str, source: &str);

    /// Records how long the request took.
    fn record_duration(&self, request_type: &str, source: &str, duration: Duration);

    /// Counts a successful request.
    fn increment_success(&self, request_type: &str, source: &str);

    /// Counts a failed request with its error code.
    fn increment_errors(&self, request_type: &str, source: &str, code: &str);
}

/// Sink that forwards to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricsSink for PrometheusMetrics {
    fn increment_requests(&self, request_type: &str, source: &str) {
        counter!(
            names::REQUESTS_TOTAL,
            "type" => request_type.to_string(),
            "source" => source.to_string()
        )
        .increment(1);
    }

    fn record_duration(&self, request_type: &str, source: &str, duration: Duration) {
        histogram!(
            names::REQUEST_DURATION,
            "type" => request_type.to_string(),
            "source" => source.to_string()
        )
        .record(duration.as_secs_f64());
    }

    fn increment_success(&self, request_type: &str, source: &str) {
        counter!(
            names::REQUESTS_SUCCEEDED,
            "type" => request_type.to_string(),
            "source" => source.to_string()
        )
        .increment(1);
    }

    fn increment_errors(&self, request_type: &str, source: &str, code: &str) {
        counter!(
            names::REQUESTS_FAILED,
            "type" => request_type.to_string(),
            "source" => source.to_string(),
            "code" => code.to_string()
        )
        .increment(1);
    }
}

/// Sink that keeps every sample in memory.
///
/// # Example
///
/// ```
/// use conduit_telemetry::metrics::{InMemoryMetrics, MetricsSink};
///
/// let metrics = InMemoryMetrics::new();
/// metrics.increment_requests("echo", "http");
/// assert_eq!(metrics.requests("echo", "http"), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<HashMap<String, u64>>,
    durations: Mutex<Vec<Duration>>,
}

impl InMemoryMetrics {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self, key: String) {
        *self.counters.lock().entry(key).or_insert(0) += 1;
    }

    fn get(&self, key: &str) -> u64 {
        self.counters.lock().get(key).copied().unwrap_or(0)
    }

    /// Returns the request count for a type/source pair.
    pub fn requests(&self, request_type: &str, source: &str) -> u64 {
        self.get(&format!("{}|{request_type}|{source}", names::REQUESTS_TOTAL))
    }

    /// Returns the success count for a type/source pair.
    pub fn successes(&self, request_type: &str, source: &str) -> u64 {
        self.get(&format!("{}|{request_type}|{source}", names::REQUESTS_SUCCEEDED))
    }

    /// Returns the failure count for a type/source/code triple.
    pub fn failures(&self, request_type: &str, source: &str, code: &str) -> u64 {
        self.get(&format!(
            "{}|{request_type}|{source}|{code}",
            names::REQUESTS_FAILED
        ))
    }

    /// Returns every recorded duration.
    pub fn durations(&self) -> Vec<Duration> {
        self.durations.lock().clone()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment_requests(&self, request_type: &str, source: &str) {
        self.bump(format!("{}|{request_type}|{source}", names::REQUESTS_TOTAL));
    }

    fn record_duration(&self, _request_type: &str, _source: &str, duration: Duration) {
        self.durations.lock().push(duration);
    }

    fn increment_success(&self, request_type: &str, source: &str) {
        self.bump(format!("{}|{request_type}|{source}", names::REQUESTS_SUCCEEDED));
    }

    fn increment_errors(&self, request_type: &str, source: &str, code: &str) {
        self.bump(format!(
            "{}|{request_type}|{source}|{code}",
            names::REQUESTS_FAILED
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.listen_addr.is_none());
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_invalid_listen_addr() {
        let config = MetricsConfig {
            listen_addr: Some("not-an-addr".to_string()),
            ..MetricsConfig::default()
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_in_memory_sink_counts() {
        let metrics = InMemoryMetrics::new();
        metrics.increment_requests("echo", "sqs");
        metrics.increment_requests("echo", "sqs");
        metrics.increment_success("echo", "sqs");
        metrics.increment_errors("echo", "sqs", "TIMEOUT");
        metrics.record_duration("echo", "sqs", Duration::from_millis(3));

        assert_eq!(metrics.requests("echo", "sqs"), 2);
        assert_eq!(metrics.successes("echo", "sqs"), 1);
        assert_eq!(metrics.failures("echo", "sqs", "TIMEOUT"), 1);
        assert_eq!(metrics.failures("echo", "sqs", "INTERNAL_ERROR"), 0);
        assert_eq!(metrics.durations(), vec![Duration::from_millis(3)]);
    }

    #[test]
    fn test_prometheus_sink_without_recorder() {
        let sink = PrometheusMetrics;
        sink.increment_requests("echo", "http");
        sink.record_duration("echo", "http", Duration::from_millis(1));
        sink.increment_success("echo", "http");
        sink.increment_errors("echo", "http", "TIMEOUT");
    }
}
