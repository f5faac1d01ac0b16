//! Worker entry points and adapter settings.

use std::sync::Arc;

use conduit_broker::{AmqpChannel, BrokerConsumer, ConsumerConfig};
use conduit_config::ConduitConfig;
use conduit_core::{Platform, UseCase};
use conduit_function::{FunctionAdapter, FunctionSettings};
use conduit_middleware::Handler;
use conduit_queue::{QueueAdapter, QueueAdapterConfig, RuntimeClient};
use conduit_server::{Server, ServerConfig, ShutdownSignal};
use conduit_telemetry::{init_telemetry, LogWriter};

use crate::error::{RunError, RunResult};
use crate::factory::default_builder;
use crate::platform::{broker_url_with, detect_platform};

/// HTTP listener settings from the `http` and `handler` sections.
pub fn server_config(config: &ConduitConfig) -> ServerConfig {
    ServerConfig::builder()
        .addr(config.http.addr.clone())
        .shutdown_timeout(config.http.shutdown_timeout())
        .max_request_size(config.handler.max_request_size)
        .max_connections((config.http.max_connections > 0).then_some(config.http.max_connections))
        .build()
}

/// Batch adapter settings from the `queue` section.
pub fn queue_config(config: &ConduitConfig) -> QueueAdapterConfig {
    let timeout = config.queue.message_timeout();
    QueueAdapterConfig {
        partial_batch_failure: config.queue.partial_batch_failure,
        message_timeout: (!timeout.is_zero()).then_some(timeout),
        concurrency: config.queue.concurrency,
    }
}

/// Consumer settings from the `broker` section.
pub fn consumer_config(config: &ConduitConfig) -> ConsumerConfig {
    let broker = &config.broker;
    let timeout = broker.message_timeout();
    let mut consumer = ConsumerConfig::new(broker.queue.clone());
    consumer.prefetch = broker.prefetch;
    consumer.message_timeout = (!timeout.is_zero()).then_some(timeout);
    if let Some(tag) = &broker.consumer_tag {
        consumer.consumer_tag.clone_from(tag);
    }
    consumer
}

/// Function identity from the `function` section.
pub fn function_settings(config: &ConduitConfig) -> FunctionSettings {
    FunctionSettings {
        name: config.function.name.clone(),
        namespace: config.function.namespace.clone(),
    }
}

/// Validates `config`, installs telemetry, detects the platform, and runs
/// `use_case` behind the matching adapter until SIGINT/SIGTERM.
///
/// A function invocation over stdin/stdout returns after its single
/// response is written.
///
/// # Errors
///
/// Returns configuration, telemetry, and adapter failures.
pub async fn run(use_case: Arc<dyn UseCase>, config: ConduitConfig) -> RunResult<()> {
    config.validate()?;
    let platform = detect_platform(&config)?;

    let mut telemetry = config.telemetry.to_telemetry_config();
    if platform == Platform::OpenFaas && !config.function.http_mode {
        // stdout carries the response
        telemetry.logging.writer = LogWriter::Stderr;
    }
    let _guard = init_telemetry(&telemetry)?;

    let shutdown = ShutdownSignal::with_os_signals().map_err(RunError::Signals)?;
    run_on(use_case, &config, platform, shutdown).await
}

/// Runs `use_case` on an explicit platform with an externally owned
/// shutdown signal. Telemetry is left untouched.
///
/// # Errors
///
/// Returns adapter failures.
pub async fn run_on(
    use_case: Arc<dyn UseCase>,
    config: &ConduitConfig,
    platform: Platform,
    shutdown: ShutdownSignal,
) -> RunResult<()> {
    let handler: Arc<Handler> = Arc::new(
        default_builder(use_case, config)
            .platform(platform.as_str())
            .build(),
    );
    tracing::info!(
        worker = handler.worker_name(),
        platform = platform.as_str(),
        middleware = ?handler.middleware_names(),
        "starting worker"
    );

    match platform {
        Platform::Http => {
            Server::new(handler, server_config(config)).run(shutdown).await?;
        }
        Platform::Sqs => {
            let client = match &config.queue.runtime_api {
                Some(api) => RuntimeClient::new(api)?,
                None => RuntimeClient::from_env().ok_or(RunError::MissingRuntimeApi)??,
            };
            let adapter = QueueAdapter::new(handler, queue_config(config));
            conduit_queue::run(&adapter, &client, shutdown.token()).await?;
        }
        Platform::RabbitMq => {
            let url = broker_url_with(config, |key| std::env::var(key).ok());
            let channel = AmqpChannel::connect(&url).await?;
            BrokerConsumer::new(handler, Arc::new(channel), consumer_config(config))
                .run(shutdown.token())
                .await?;
        }
        Platform::OpenFaas => {
            let adapter = FunctionAdapter::new(handler, function_settings(config));
            if config.function.http_mode {
                adapter.serve_http(server_config(config), shutdown).await?;
            } else {
                let response = adapter.run_stdio(shutdown.token()).await?;
                tracing::debug!(success = response.is_success(), "function invocation written");
            }
        }
    }

    tracing::info!(platform = platform.as_str(), "worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_config::{BrokerConfig, HttpConfig, QueueConfig};
    use std::time::Duration;

    #[test]
    fn test_server_config_mapping() {
        let config = ConduitConfig {
            http: HttpConfig {
                addr: "127.0.0.1:9000".to_string(),
                max_connections: 0,
                ..HttpConfig::default()
            },
            ..ConduitConfig::default()
        };
        let server = server_config(&config);
        assert_eq!(server.addr(), "127.0.0.1:9000");
        assert_eq!(server.max_connections(), None);
        assert_eq!(server.max_request_size(), config.handler.max_request_size);
    }

    #[test]
    fn test_queue_config_mapping() {
        let config = ConduitConfig {
            queue: QueueConfig {
                partial_batch_failure: false,
                message_timeout_ms: 0,
                concurrency: 4,
                ..QueueConfig::default()
            },
            ..ConduitConfig::default()
        };
        let queue = queue_config(&config);
        assert!(!queue.partial_batch_failure);
        assert_eq!(queue.message_timeout, None);
        assert_eq!(queue.concurrency, 4);
    }

    #[test]
    fn test_consumer_config_mapping() {
        let config = ConduitConfig {
            broker: BrokerConfig {
                queue: "orders".to_string(),
                prefetch: 3,
                message_timeout_ms: 1_500,
                consumer_tag: Some("orders-1".to_string()),
                ..BrokerConfig::default()
            },
            ..ConduitConfig::default()
        };
        let consumer = consumer_config(&config);
        assert_eq!(consumer.queue, "orders");
        assert_eq!(consumer.prefetch, 3);
        assert_eq!(consumer.message_timeout, Some(Duration::from_millis(1_500)));
        assert_eq!(consumer.consumer_tag, "orders-1");
    }
}
