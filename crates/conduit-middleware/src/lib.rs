//! # Conduit Middleware
//!
//! The handler chain that sits between platform adapters and a use case.
//!
//! A [`Handler`] owns an ordered list of [`Middleware`] and a terminal
//! [`UseCase`](conduit_core::UseCase). Middleware registered first runs
//! outermost: first on the way in, last on the way out.
//!
//! ```text
//! Adapter → Recovery → Timeout → Tracing → Metrics → Logging → Validation → Retry → UseCase
//! ```
//!
//! ## Example
//!
//! ```
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_core::{Request, RequestScope};
//! use conduit_middleware::stages::{RecoveryMiddleware, ValidationMiddleware};
//! use conduit_middleware::Handler;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let handler = Handler::builder(Arc::new(EchoUseCase::new()))
//!     .middleware(RecoveryMiddleware::new())
//!     .middleware(ValidationMiddleware::new())
//!     .build();
//!
//! let response = handler
//!     .handle(&RequestScope::new(), Request::new("echo", r#"{"x":1}"#))
//!     .await
//!     .unwrap();
//! assert!(response.is_success());
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod handler;
pub mod middleware;
pub mod stages;

pub use handler::{BoxedMiddleware, Handler, HandlerBuilder, Stage};
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next};
