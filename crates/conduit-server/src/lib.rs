//! # Conduit Server
//!
//! HTTP adapter for the Conduit request-dispatch framework.
//!
//! - One business request per `POST`, on any path
//! - Health endpoints that bypass the middleware chain
//! - Fixed error-code to status-code mapping
//! - Graceful shutdown on SIGTERM/SIGINT with a bounded drain
//!
//! The request/response translation in [`translate`] is public so other
//! HTTP-shaped adapters can reuse it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_middleware::Handler;
//! use conduit_server::{Server, ServerConfig, ShutdownSignal};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
//!     let server = Server::new(Arc::new(handler), ServerConfig::default());
//!
//!     server.run(ShutdownSignal::with_os_signals()?).await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
pub mod health;
mod server;
mod shutdown;
pub mod translate;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_ADDR, DEFAULT_MAX_REQUEST_SIZE,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use error::ServerError;
pub use health::{HealthStatus, HEALTH_PATHS};
pub use server::{serve_with, HttpHandler, Server};
pub use shutdown::ShutdownSignal;
pub use translate::{HttpResponse, ResponseBody};
