//! Default handler wiring.

use std::sync::Arc;

use conduit_config::ConduitConfig;
use conduit_core::UseCase;
use conduit_middleware::stages::{
    LoggingMiddleware, MetricsMiddleware, RecoveryMiddleware, RetryMiddleware, RetryPolicy,
    TimeoutMiddleware, TracingMiddleware, ValidationMiddleware,
};
use conduit_middleware::{Handler, HandlerBuilder};
use conduit_telemetry::{MetricsSink, PrometheusMetrics};

/// Converts the retry section into a middleware policy.
pub fn retry_policy(config: &ConduitConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.retry.max_attempts,
        initial_backoff: config.retry.initial_backoff(),
        max_backoff: config.retry.max_backoff(),
        multiplier: config.retry.multiplier,
    }
}

/// Returns a builder preloaded with the default stack, outermost first:
///
/// ```text
/// Recovery → Timeout → Tracing → Metrics → Logging → Validation → Retry → use case
/// ```
///
/// Timeout is skipped when the handler timeout is zero; Tracing and Metrics
/// follow their `handler` toggles. Metrics go to the global `metrics`
/// recorder.
pub fn default_builder(use_case: Arc<dyn UseCase>, config: &ConduitConfig) -> HandlerBuilder {
    default_builder_with_sink(use_case, config, Arc::new(PrometheusMetrics))
}

/// Like [`default_builder`] with an explicit metrics sink.
pub fn default_builder_with_sink(
    use_case: Arc<dyn UseCase>,
    config: &ConduitConfig,
    sink: Arc<dyn MetricsSink>,
) -> HandlerBuilder {
    let handler = &config.handler;
    let mut builder = Handler::builder(use_case)
        .worker_name(config.worker.name.clone())
        .middleware(RecoveryMiddleware::new());

    if let Some(timeout) = handler.timeout() {
        builder = builder.middleware(TimeoutMiddleware::new(timeout));
    }
    if handler.enable_tracing {
        builder = builder
            .middleware(TracingMiddleware::new().export_spans(config.telemetry.tracing.enabled));
    }
    if handler.enable_metrics {
        builder = builder.middleware(MetricsMiddleware::new(sink));
    }

    builder = builder
        .middleware(LoggingMiddleware::new())
        .middleware(ValidationMiddleware::new().allow_empty_payload(handler.allow_empty_payload))
        .middleware(RetryMiddleware::new(retry_policy(config)));

    match &config.worker.platform {
        Some(platform) => builder.platform(platform.clone()),
        None => builder,
    }
}

/// Builds the default handler for `use_case`.
///
/// # Example
///
/// ```rust
/// use conduit::default_handler;
/// use conduit_config::ConduitConfig;
/// use conduit_core::fixtures::EchoUseCase;
/// use std::sync::Arc;
///
/// let handler = default_handler(Arc::new(EchoUseCase::new()), &ConduitConfig::default());
/// assert_eq!(handler.middleware_names()[0], "recovery");
/// ```
pub fn default_handler(use_case: Arc<dyn UseCase>, config: &ConduitConfig) -> Handler {
    default_builder(use_case, config).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_config::HandlerConfig;
    use conduit_core::fixtures::{EchoUseCase, FlakyUseCase};
    use conduit_core::{ErrorCode, Request, RequestScope};
    use conduit_telemetry::InMemoryMetrics;
    use std::time::Duration;

    #[test]
    fn test_default_order() {
        let handler = default_handler(Arc::new(EchoUseCase::new()), &ConduitConfig::default());
        assert_eq!(
            handler.middleware_names(),
            &["recovery", "timeout", "tracing", "metrics", "logging", "validation", "retry"]
        );
    }

    #[test]
    fn test_toggles_drop_stages() {
        let config = ConduitConfig {
            handler: HandlerConfig {
                timeout_ms: 0,
                enable_metrics: false,
                enable_tracing: false,
                ..HandlerConfig::default()
            },
            ..ConduitConfig::default()
        };
        let handler = default_handler(Arc::new(EchoUseCase::new()), &config);
        assert_eq!(
            handler.middleware_names(),
            &["recovery", "logging", "validation", "retry"]
        );
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = retry_policy(&ConduitConfig::default());
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
        assert_eq!(policy.max_backoff, Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stack_retries_and_counts_once() {
        let metrics = Arc::new(InMemoryMetrics::new());
        let flaky = Arc::new(FlakyUseCase::new(2));
        let handler = default_builder_with_sink(flaky.clone(), &ConduitConfig::default(), metrics.clone())
            .platform("http")
            .build();

        let request = Request::new("job", r#"{"n":1}"#).with_source("http");
        let response = handler.handle(&RequestScope::new(), request).await.unwrap();

        assert!(response.is_success());
        assert_eq!(flaky.calls(), 3);
        assert_eq!(metrics.requests("job", "http"), 1);
        assert_eq!(metrics.successes("job", "http"), 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_use_case() {
        let echo = Arc::new(EchoUseCase::new());
        let handler = default_handler(echo.clone(), &ConduitConfig::default());

        let response = handler
            .handle(&RequestScope::new(), Request::new("job", "not json"))
            .await
            .unwrap();

        assert_eq!(response.error_code(), Some(&ErrorCode::Validation));
        assert_eq!(echo.calls(), 0);
    }
}
