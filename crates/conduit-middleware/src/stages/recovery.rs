//! Panic containment.
//!
//! The recovery stage is the one place the framework installs a catch-all
//! boundary. A panic raised anywhere downstream (including one re-raised by
//! the timeout stage from its worker task) is logged with a backtrace and
//! converted into a non-retryable `INTERNAL_ERROR` response paired with a
//! [`HandlerError::Panic`], so callers can tell a hard failure from a
//! graceful one. Register it outermost.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{HandlerError, HandlerResult, Request, RequestScope};
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Middleware that converts downstream panics into errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates a new recovery middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Renders a panic payload as text.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match AssertUnwindSafe(next.run(scope, request)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    let backtrace = Backtrace::force_capture();
                    error!(
                        request_id = scope.request_id().unwrap_or_default(),
                        panic = %message,
                        backtrace = %backtrace,
                        "recovered from panic"
                    );
                    Err(HandlerError::panic(message))
                }
            }
        })
    }
}
