//! Observability for Conduit workers.
//!
//! - **Logging**: structured logs through `tracing-subscriber`
//! - **Metrics**: Prometheus metrics through the `metrics` facade
//! - **Tracing**: OpenTelemetry spans exported over OTLP
//!
//! The middleware layer depends only on [`metrics::MetricsSink`] and the
//! global tracer; this crate decides where the data ends up.
//!
//! # Example
//!
//! ```rust,ignore
//! use conduit_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::builder()
//!     .service("orders", "1.0.0", "production")
//!     .otlp_endpoint("http://collector:4317")
//!     .build();
//!
//! let _guard = init_telemetry(&config)?;
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod tracing;

pub use config::{TelemetryConfig, TelemetryConfigBuilder};
pub use error::TelemetryError;
pub use logging::{fields, init_logging, LogConfig, LogWriter};
pub use metrics::{init_metrics, InMemoryMetrics, MetricsConfig, MetricsSink, PrometheusMetrics};
pub use tracing::{init_tracing, TracingConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Flushes and shuts down the tracer provider on drop.
///
/// Keep the guard alive for the lifetime of the worker.
#[must_use = "dropping the guard shuts tracing down"]
pub struct TelemetryGuard {
    tracer_provider: Option<opentelemetry_sdk::trace::TracerProvider>,
}

impl TelemetryGuard {
    /// Creates a guard over an optional provider.
    pub fn new(tracer_provider: Option<opentelemetry_sdk::trace::TracerProvider>) -> Self {
        Self { tracer_provider }
    }

    /// Returns `true` if spans are being exported.
    pub fn is_tracing(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take() {
            for result in provider.force_flush() {
                if let Err(e) = result {
                    ::tracing::warn!(error = %e, "failed to flush tracer provider");
                }
            }
            if let Err(e) = provider.shutdown() {
                ::tracing::warn!(error = %e, "failed to shut down tracer provider");
            }
        }
    }
}

/// Installs logging, then metrics, then tracing.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;
    let tracer_provider = init_tracing(&config.tracing)?;
    Ok(TelemetryGuard::new(tracer_provider))
}
