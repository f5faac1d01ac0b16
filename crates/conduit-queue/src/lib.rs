//! # Conduit Queue
//!
//! Queue-trigger batch adapter for the Conduit request-dispatch framework.
//!
//! The adapter accepts SQS-shaped batch events, runs each message through a
//! shared handler, and reports which messages the queue should redeliver.
//! [`runtime`] drives it from the Lambda Runtime API.
//!
//! ## Example
//!
//! ```rust
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_core::RequestScope;
//! use conduit_middleware::Handler;
//! use conduit_queue::{QueueAdapter, QueueAdapterConfig, SqsEvent, SqsMessage};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
//! let adapter = QueueAdapter::new(Arc::new(handler), QueueAdapterConfig::default());
//!
//! let event = SqsEvent::new([SqsMessage::new("m-1", r#"{"x":1}"#)]);
//! let response = adapter.process_batch(&RequestScope::new(), &event).await.unwrap();
//! assert!(response.is_empty());
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-queue/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod adapter;
mod error;
mod event;
pub mod runtime;

pub use adapter::{
    request_from_message, MessageOutcome, QueueAdapter, QueueAdapterConfig, DEFAULT_REQUEST_TYPE,
    REQUEST_ID_ATTRIBUTES, REQUEST_TYPE_ATTRIBUTES, SOURCE, TRACE_HEADER_KEY,
};
pub use error::{QueueError, QueueResult};
pub use event::{BatchItemFailure, BatchResponse, MessageAttribute, SqsEvent, SqsMessage};
pub use runtime::{run, ErrorReport, Invocation, RuntimeClient, RUNTIME_API_ENV};
