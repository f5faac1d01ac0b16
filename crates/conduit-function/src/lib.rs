//! # Conduit Function
//!
//! Stdin/stdout function adapter for the Conduit request-dispatch framework,
//! shaped after the OpenFaaS classic watchdog.
//!
//! Each process invocation reads its whole input, treats it either as a
//! complete request object or as a raw payload described by the `Http_*`
//! environment, dispatches it, and writes exactly one JSON response to
//! stdout. Diagnostics go to stderr only.
//!
//! [`FunctionAdapter::serve_http`] runs the same translation behind an HTTP
//! listener for watchdogs that proxy over HTTP.
//!
//! ## Example
//!
//! ```rust
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_core::RequestScope;
//! use conduit_function::{FunctionAdapter, FunctionEnv, FunctionSettings};
//! use conduit_middleware::Handler;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
//! let adapter = FunctionAdapter::new(Arc::new(handler), FunctionSettings::named("echo"));
//!
//! let mut stdout = Vec::new();
//! let response = adapter
//!     .invoke(
//!         &RequestScope::new(),
//!         &FunctionEnv::default(),
//!         &b"{\"n\":1}"[..],
//!         &mut stdout,
//!         tokio::io::sink(),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert!(response.is_success());
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-function/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod adapter;
pub mod env;
mod error;
mod http_mode;
mod translate;

pub use adapter::FunctionAdapter;
pub use env::{FunctionEnv, FPROCESS_VAR, FUNCTION_NAME_VAR, NAMESPACE_VAR};
pub use error::{FunctionError, FunctionResult};
pub use http_mode::FunctionHttp;
pub use translate::{
    request_from_input, FunctionSettings, DEFAULT_REQUEST_TYPE, REQUEST_ID_HEADERS, SOURCE,
};
