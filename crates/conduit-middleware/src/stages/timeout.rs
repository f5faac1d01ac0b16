//! Hard deadline enforcement.
//!
//! The downstream chain runs on its own Tokio task while this stage waits
//! on the task's join handle (a single-slot result) or the deadline,
//! whichever comes first; the deadline wins a tie. On expiry the scope
//! handed to the task is cancelled and the task is abandoned rather than
//! aborted: code that observes [`RequestScope::cancelled`] winds down
//! promptly, code that ignores it runs to completion in the background and
//! its result is discarded.
//!
//! A panic inside the task is re-raised here so an outer recovery stage
//! still sees it.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{CancelCause, ErrorCode, HandlerError, HandlerResult, Request, RequestScope, Response};
use std::time::Duration;
use tracing::warn;

/// Middleware that bounds downstream processing time.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Creates a timeout stage with the given budget.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the configured budget.
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    fn expired(&self, scope: &RequestScope) -> HandlerError {
        warn!(
            request_id = scope.request_id().unwrap_or_default(),
            timeout_ms = self.timeout.as_millis() as u64,
            "request timed out"
        );
        HandlerError::from_cause(
            CancelCause::DeadlineExceeded,
            Response::failure(
                ErrorCode::Timeout,
                format!("request timed out after {:?}", self.timeout),
                true,
            ),
        )
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let task_scope = scope.with_timeout(self.timeout);
            let deadline = task_scope.clone();
            let next = next.clone();

            let mut task = tokio::spawn(async move { next.run(&task_scope, request).await });

            tokio::select! {
                biased;
                cause = deadline.cancelled() => {
                    deadline.cancel();
                    match cause {
                        CancelCause::DeadlineExceeded => Err(self.expired(scope)),
                        CancelCause::Cancelled => Err(HandlerError::cancelled()),
                    }
                }
                joined = &mut task => {
                    let result = match joined {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(_) => Err(HandlerError::cancelled()),
                    };
                    // A task that wound down on the expired deadline reports the timeout.
                    let expired = deadline.cause() == Some(CancelCause::DeadlineExceeded);
                    match result {
                        Ok(response) if response.is_success() || !expired => Ok(response),
                        Err(e) if !expired => Err(e),
                        _ => Err(self.expired(scope)),
                    }
                }
            }
        })
    }
}
