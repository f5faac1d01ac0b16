//! # Conduit
//!
//! **Write a use case once, run it behind any transport.**
//!
//! Conduit normalizes inbound events into one [`Request`] shape, runs them
//! through a composable middleware chain, invokes your [`UseCase`], and
//! translates the [`Response`] back into each transport's native
//! semantics:
//!
//! | Platform  | Adapter                         | Failure signal                      |
//! |-----------|---------------------------------|-------------------------------------|
//! | HTTP      | [`server::Server`]              | status code from the error code     |
//! | SQS       | [`queue::QueueAdapter`]         | `batchItemFailures` entry           |
//! | RabbitMQ  | [`broker::BrokerConsumer`]      | nack, requeued once                 |
//! | OpenFaaS  | [`function::FunctionAdapter`]   | failed response on stdout           |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit::prelude::*;
//! use std::sync::Arc;
//!
//! struct Greet;
//!
//! #[async_trait]
//! impl UseCase for Greet {
//!     async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
//!         Ok(Response::success(request.payload))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new()
//!         .with_defaults()
//!         .with_env_prefix(ENV_PREFIX)
//!         .load()?;
//!
//!     conduit::run(Arc::new(Greet), config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Middleware order
//!
//! [`default_handler`] wires, outermost first:
//!
//! ```text
//! Recovery → Timeout → Tracing → Metrics → Logging → Validation → Retry → use case
//! ```

#![doc(html_root_url = "https://docs.rs/conduit/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod factory;
pub mod platform;
mod worker;

pub use error::{RunError, RunResult};
pub use factory::{default_builder, default_builder_with_sink, default_handler, retry_policy};
pub use platform::{detect_platform, detect_platform_with};
pub use worker::{consumer_config, function_settings, queue_config, run, run_on, server_config};

pub use conduit_core::{
    async_trait, ErrorCode, HandlerError, HandlerResult, Platform, Request, RequestScope,
    Response, UseCase,
};

// Re-export the member crates
pub use conduit_broker as broker;
pub use conduit_config as config;
pub use conduit_core as core;
pub use conduit_function as function;
pub use conduit_middleware as middleware;
pub use conduit_queue as queue;
pub use conduit_server as server;
pub use conduit_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// ```rust
/// use conduit::prelude::*;
/// ```
pub mod prelude {
    pub use conduit_config::{ConduitConfig, ConfigLoader, ENV_PREFIX};
    pub use conduit_core::{
        async_trait, ErrorCode, FnUseCase, HandlerError, HandlerResult, Platform, Request,
        RequestScope, Response, UseCase,
    };
    pub use conduit_middleware::{Handler, Middleware};

    pub use crate::{default_handler, run, RunError};
}
