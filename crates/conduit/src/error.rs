//! Facade errors.

use thiserror::Error;

/// Failures that stop a worker.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration failed validation.
    #[error("configuration error: {0}")]
    Config(#[from] conduit_config::ConfigError),

    /// Telemetry could not be installed.
    #[error("telemetry error: {0}")]
    Telemetry(#[from] conduit_telemetry::TelemetryError),

    /// `worker.platform` names no known platform.
    #[error("{0}")]
    UnknownPlatform(String),

    /// Signal handlers could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// The queue trigger has no runtime API to poll.
    #[error("no runtime API configured: set queue.runtime_api or {}", conduit_queue::RUNTIME_API_ENV)]
    MissingRuntimeApi,

    /// The HTTP adapter failed.
    #[error(transparent)]
    Server(#[from] conduit_server::ServerError),

    /// The queue adapter failed.
    #[error(transparent)]
    Queue(#[from] conduit_queue::QueueError),

    /// The broker adapter failed.
    #[error(transparent)]
    Broker(#[from] conduit_broker::BrokerError),

    /// The function adapter failed.
    #[error(transparent)]
    Function(#[from] conduit_function::FunctionError),
}

/// Result alias for facade operations.
pub type RunResult<T> = Result<T, RunError>;
