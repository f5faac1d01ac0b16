//! Root configuration type.
//!
//! This module provides [`ConduitConfig`] and its builder.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::{
    BrokerConfig, ConfigError, FunctionConfig, HandlerConfig, HttpConfig, LogFormat, QueueConfig,
    RetryConfig, TelemetrySection, WorkerConfig,
};
use conduit_core::Platform;

/// Complete worker configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use conduit_config::ConduitConfig;
///
/// let config = ConduitConfig::default();
/// assert_eq!(config.http.addr, "0.0.0.0:8080");
/// assert_eq!(config.retry.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ConduitConfig {
    /// Worker identity.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Handler-wide settings.
    #[serde(default)]
    pub handler: HandlerConfig,

    /// Retry policy.
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP adapter.
    #[serde(default)]
    pub http: HttpConfig,

    /// Queue-trigger batch adapter.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Broker-consumer adapter.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Stdin/stdout function adapter.
    #[serde(default)]
    pub function: FunctionConfig,

    /// Metrics, tracing and logging.
    #[serde(default)]
    pub telemetry: TelemetrySection,
}

impl ConduitConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::{ConduitConfig, HttpConfig};
    ///
    /// let config = ConduitConfig::builder()
    ///     .http(HttpConfig {
    ///         addr: "127.0.0.1:3000".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.http.addr, "127.0.0.1:3000");
    /// ```
    #[must_use]
    pub fn builder() -> ConduitConfigBuilder {
        ConduitConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field:
    /// - `worker.platform` is not a known platform
    /// - `handler.max_request_size` is zero
    /// - `retry.multiplier` is below 1.0
    /// - `retry.max_backoff_ms` is below `retry.initial_backoff_ms`
    /// - `http.addr` or `telemetry.metrics.addr` is not a socket address
    /// - `queue.concurrency` or `broker.prefetch` is zero
    /// - `telemetry.tracing.sampling_ratio` is outside 0.0..=1.0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(platform) = &self.worker.platform {
            platform
                .parse::<Platform>()
                .map_err(|reason| ConfigError::invalid_value("worker.platform", reason))?;
        }

        if self.handler.max_request_size == 0 {
            return Err(ConfigError::invalid_value(
                "handler.max_request_size",
                "must be greater than zero",
            ));
        }

        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::invalid_value(
                "retry.multiplier",
                "must be at least 1.0",
            ));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(ConfigError::invalid_value(
                "retry.max_backoff_ms",
                "must not be less than retry.initial_backoff_ms",
            ));
        }

        if self.http.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "http.addr",
                format!("invalid socket address: {}", self.http.addr),
            ));
        }

        if self.queue.concurrency == 0 {
            return Err(ConfigError::invalid_value(
                "queue.concurrency",
                "must be greater than zero",
            ));
        }

        if self.broker.prefetch == 0 {
            return Err(ConfigError::invalid_value(
                "broker.prefetch",
                "must be greater than zero",
            ));
        }

        if let Some(addr) = &self.telemetry.metrics.addr {
            if self.telemetry.metrics.enabled && addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::invalid_value(
                    "telemetry.metrics.addr",
                    format!("invalid socket address: {addr}"),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.telemetry.tracing.sampling_ratio) {
            return Err(ConfigError::invalid_value(
                "telemetry.tracing.sampling_ratio",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug-level logs and no retry delay worth waiting for.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::ConduitConfig;
    ///
    /// let config = ConduitConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.environment = "development".to_string();

        config.retry.initial_backoff_ms = 10;
        config.retry.max_backoff_ms = 100;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON info-level logs and trace export enabled.
    ///
    /// # Example
    ///
    /// ```
    /// use conduit_config::{ConduitConfig, LogFormat};
    ///
    /// let config = ConduitConfig::production();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    /// assert!(config.telemetry.tracing.enabled);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();
        config.telemetry.tracing.enabled = true;

        config
    }
}

/// Builder for [`ConduitConfig`].
#[derive(Debug, Default)]
pub struct ConduitConfigBuilder {
    config: ConduitConfig,
}

impl ConduitConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker section.
    #[must_use]
    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.config.worker = worker;
        self
    }

    /// Set the handler section.
    #[must_use]
    pub fn handler(mut self, handler: HandlerConfig) -> Self {
        self.config.handler = handler;
        self
    }

    /// Set the retry section.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the HTTP section.
    #[must_use]
    pub fn http(mut self, http: HttpConfig) -> Self {
        self.config.http = http;
        self
    }

    /// Set the queue section.
    #[must_use]
    pub fn queue(mut self, queue: QueueConfig) -> Self {
        self.config.queue = queue;
        self
    }

    /// Set the broker section.
    #[must_use]
    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.config.broker = broker;
        self
    }

    /// Set the function section.
    #[must_use]
    pub fn function(mut self, function: FunctionConfig) -> Self {
        self.config.function = function;
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.config.telemetry = telemetry;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ConduitConfig {
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<ConduitConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricsSection, TracingSection};

    #[test]
    fn test_default_config() {
        let config = ConduitConfig::default();
        assert_eq!(config.worker.name, "conduit-worker");
        assert_eq!(config.handler.max_request_size, 10 * 1024 * 1024);
        assert_eq!(config.broker.prefetch, 10);
        assert!(config.queue.partial_batch_failure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_platform() {
        let config = ConduitConfig::builder()
            .worker(WorkerConfig {
                platform: Some("mainframe".to_string()),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker.platform"));
    }

    #[test]
    fn test_validate_retry_multiplier() {
        let result = ConduitConfig::builder()
            .retry(RetryConfig {
                multiplier: 0.5,
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("retry.multiplier"));
    }

    #[test]
    fn test_validate_backoff_order() {
        let result = ConduitConfig::builder()
            .retry(RetryConfig {
                initial_backoff_ms: 1_000,
                max_backoff_ms: 500,
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("max_backoff_ms"));
    }

    #[test]
    fn test_validate_zero_prefetch() {
        let result = ConduitConfig::builder()
            .broker(BrokerConfig {
                prefetch: 0,
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("broker.prefetch"));
    }

    #[test]
    fn test_validate_zero_request_size() {
        let result = ConduitConfig::builder()
            .handler(HandlerConfig {
                max_request_size: 0,
                ..Default::default()
            })
            .build_validated();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("handler.max_request_size"));
    }

    #[test]
    fn test_validate_addresses() {
        let result = ConduitConfig::builder()
            .http(HttpConfig {
                addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build_validated();
        assert!(result.unwrap_err().to_string().contains("http.addr"));

        let result = ConduitConfig::builder()
            .telemetry(TelemetrySection {
                metrics: MetricsSection {
                    enabled: true,
                    addr: Some("invalid".to_string()),
                },
                ..Default::default()
            })
            .build_validated();
        assert!(result.unwrap_err().to_string().contains("metrics.addr"));
    }

    #[test]
    fn test_validate_sampling_ratio() {
        let result = ConduitConfig::builder()
            .telemetry(TelemetrySection {
                tracing: TracingSection {
                    sampling_ratio: 2.0,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("sampling_ratio"));
    }

    #[test]
    fn test_presets() {
        let dev = ConduitConfig::development();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(dev.retry.initial_backoff_ms, 10);
        assert!(dev.validate().is_ok());

        let prod = ConduitConfig::production();
        assert_eq!(prod.telemetry.environment, "production");
        assert_eq!(prod.telemetry.logging.level, "info");
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            [worker]
            name = "orders-worker"
            platform = "rabbitmq"

            [broker]
            queue = "orders"
            prefetch = 5

            [telemetry.logging]
            level = "warn"
        "#;

        let config: ConduitConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.worker.name, "orders-worker");
        assert_eq!(config.broker.queue, "orders");
        assert_eq!(config.broker.prefetch, 5);
        assert_eq!(config.telemetry.logging.level, "warn");
        assert_eq!(config.http.addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<ConduitConfig, _> = toml::from_str("[server]\nport = 80\n");
        assert!(result.is_err());
    }
}
