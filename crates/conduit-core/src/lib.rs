//! # Conduit Core
//!
//! Core types and traits for the Conduit request-dispatch framework.
//!
//! This crate provides the normalized contract every other layer speaks:
//!
//! - [`Request`] - The unit of work entering the middleware chain
//! - [`Response`] - The unit of result leaving the chain
//! - [`ErrorCode`] / [`ErrorInfo`] - Machine-readable failure vocabulary
//! - [`HandlerError`] - Errors returned alongside (or instead of) a response
//! - [`RequestScope`] - Cancellation, deadline and typed request-scoped metadata
//! - [`UseCase`] - The business-logic contract invoked at the end of the chain
//!
//! Transport adapters build a [`Request`] from their native event, hand it to
//! a handler, and translate the resulting [`HandlerResult`] back.

#![doc(html_root_url = "https://docs.rs/conduit-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod code;
mod error;
pub mod fixtures;
mod platform;
mod request;
mod response;
mod scope;
mod use_case;

mod raw_json;

pub use code::{ErrorCode, ErrorInfo};
pub use error::{HandlerError, HandlerResult};
pub use platform::Platform;
pub use request::Request;
pub use response::Response;
pub use scope::{CancelCause, RequestScope};
pub use use_case::{FnUseCase, UseCase};

// Re-exported so implementors of `UseCase` don't need their own dependency.
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
