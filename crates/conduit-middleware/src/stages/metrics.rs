//! Per-request metrics.
//!
//! Every request increments the request counter and records a duration.
//! Exactly one of the success or error counters is then incremented. The
//! error counter is tagged with the response's error code, `INTERNAL_ERROR`
//! for bare errors and panics, or `CANCELLED` when the request future is
//! dropped before it completes.
//!
//! A panic from below is recorded and then resumed so an outer recovery
//! stage still sees it.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{ErrorCode, HandlerResult, Request, RequestScope};
use conduit_telemetry::MetricsSink;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;

/// Middleware that records request counters and durations.
#[derive(Clone)]
pub struct MetricsMiddleware {
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for MetricsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsMiddleware").finish_non_exhaustive()
    }
}

impl MetricsMiddleware {
    /// Creates a metrics stage that reports to `sink`.
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }
}

/// Records exactly once, on `finish` or on drop.
struct InFlight<'a> {
    sink: &'a dyn MetricsSink,
    request_type: String,
    source: String,
    started: Instant,
    recorded: bool,
}

impl InFlight<'_> {
    fn finish(mut self, error_code: Option<&str>) {
        self.record(error_code);
    }

    fn record(&mut self, error_code: Option<&str>) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        self.sink
            .record_duration(&self.request_type, &self.source, self.started.elapsed());
        match error_code {
            None => self.sink.increment_success(&self.request_type, &self.source),
            Some(code) => self
                .sink
                .increment_errors(&self.request_type, &self.source, code),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.record(Some(ErrorCode::Cancelled.as_str()));
    }
}

fn error_code(result: &HandlerResult) -> Option<String> {
    match result {
        Ok(response) if response.is_success() => None,
        Ok(response) => Some(
            response
                .error_code()
                .map_or_else(|| ErrorCode::Internal.to_string(), ToString::to_string),
        ),
        Err(e) => Some(
            e.response()
                .and_then(|r| r.error_code())
                .map_or_else(|| ErrorCode::Internal.to_string(), ToString::to_string),
        ),
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            self.sink
                .increment_requests(&request.request_type, &request.source);
            let in_flight = InFlight {
                sink: self.sink.as_ref(),
                request_type: request.request_type.clone(),
                source: request.source.clone(),
                started: Instant::now(),
                recorded: false,
            };

            match AssertUnwindSafe(next.run(scope, request)).catch_unwind().await {
                Ok(result) => {
                    in_flight.finish(error_code(&result).as_deref());
                    result
                }
                Err(panic) => {
                    in_flight.finish(Some(ErrorCode::Internal.as_str()));
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}
