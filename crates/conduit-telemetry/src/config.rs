//! Telemetry configuration.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;
use crate::tracing::TracingConfig;

/// Configuration for all telemetry subsystems.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Tracing configuration.
    pub tracing: TracingConfig,

    /// Logging configuration.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TelemetryConfigBuilder {
        TelemetryConfigBuilder::default()
    }
}

/// Builder for [`TelemetryConfig`].
#[derive(Debug, Default)]
pub struct TelemetryConfigBuilder {
    config: TelemetryConfig,
}

impl TelemetryConfigBuilder {
    /// Sets the service identity used in trace resources.
    #[must_use]
    pub fn service(mut self, name: &str, version: &str, environment: &str) -> Self {
        self.config.tracing.service_name = name.to_string();
        self.config.tracing.service_version = version.to_string();
        self.config.tracing.environment = environment.to_string();
        self
    }

    /// Sets the metrics configuration.
    #[must_use]
    pub fn metrics(mut self, config: MetricsConfig) -> Self {
        self.config.metrics = config;
        self
    }

    /// Sets the tracing configuration.
    #[must_use]
    pub fn tracing(mut self, config: TracingConfig) -> Self {
        self.config.tracing = config;
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn logging(mut self, config: LogConfig) -> Self {
        self.config.logging = config;
        self
    }

    /// Enables OTLP export to `endpoint`.
    #[must_use]
    pub fn otlp_endpoint(mut self, endpoint: &str) -> Self {
        self.config.tracing.enabled = true;
        self.config.tracing.otlp_endpoint = endpoint.to_string();
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> TelemetryConfig {
        self.config
    }
}
