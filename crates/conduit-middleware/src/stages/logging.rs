//! Structured request logging.
//!
//! Emits one event when a request enters the stage and one when it leaves,
//! and stamps the elapsed time onto the response.
//!
//! Start fields: `request_id`, `trace_id`, `span_id`, `request_type`,
//! `source`, `payload_bytes`. Completion adds `duration_ms`, `success`, and
//! `error_code` for failures.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{HandlerResult, Request, RequestScope};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Middleware that logs request start and completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Creates the logging stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let request_id = request.id.clone();
            let request_type = request.request_type.clone();
            let source = request.source.clone();
            let trace_id = scope.trace_id().unwrap_or_default().to_string();
            let span_id = scope.span_id().unwrap_or_default().to_string();

            debug!(
                request_id = %request_id,
                trace_id = %trace_id,
                span_id = %span_id,
                request_type = %request_type,
                source = %source,
                payload_bytes = request.payload.len(),
                "request started"
            );

            let started = Instant::now();
            let mut result = next.run(scope, request).await;
            let elapsed = started.elapsed();
            let duration_ms = elapsed.as_secs_f64() * 1000.0;

            match &mut result {
                Ok(response) => {
                    response.set_duration(elapsed);
                    if response.is_success() {
                        info!(
                            request_id = %request_id,
                            trace_id = %trace_id,
                            span_id = %span_id,
                            request_type = %request_type,
                            source = %source,
                            duration_ms,
                            success = true,
                            "request completed"
                        );
                    } else {
                        let error_code = response
                            .error_code()
                            .map(ToString::to_string)
                            .unwrap_or_default();
                        warn!(
                            request_id = %request_id,
                            trace_id = %trace_id,
                            span_id = %span_id,
                            request_type = %request_type,
                            source = %source,
                            duration_ms,
                            success = false,
                            error_code = %error_code,
                            retryable = response.is_retryable(),
                            "request failed"
                        );
                    }
                }
                Err(e) => {
                    if let Some(response) = e.response_mut() {
                        response.set_duration(elapsed);
                    }
                    let error_code = e
                        .response()
                        .and_then(|r| r.error_code())
                        .map_or_else(|| "INTERNAL_ERROR".to_string(), ToString::to_string);
                    warn!(
                        request_id = %request_id,
                        trace_id = %trace_id,
                        span_id = %span_id,
                        request_type = %request_type,
                        source = %source,
                        duration_ms,
                        success = false,
                        error_code = %error_code,
                        error = %e,
                        "request errored"
                    );
                }
            }

            result
        })
    }
}
