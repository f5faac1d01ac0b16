//! Retry with exponential backoff.
//!
//! Attempt 0 is the first call; attempts `1..=max_attempts` are retries, so
//! downstream runs at most `max_attempts + 1` times. Between attempt `i` and
//! `i + 1` the stage waits `min(initial_backoff * multiplier^i, max_backoff)`.
//! The wait is abandoned as soon as the scope is cancelled.
//!
//! A failure is retried when, checked in order:
//!
//! 1. it is not a cancellation or deadline error
//! 2. its response has `retryable` set, or
//! 3. its response carries a transient code (`TIMEOUT`, `NETWORK_ERROR`,
//!    `RATE_LIMITED`, `TEMPORARY_ERROR`, `SERVICE_UNAVAILABLE`,
//!    `GATEWAY_TIMEOUT`), or
//! 4. it is a bare error with no response at all.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{ErrorCode, HandlerError, HandlerResult, Request, RequestScope, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff and attempt limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_attempts: u32,

    /// Wait before the first retry.
    pub initial_backoff: Duration,

    /// Upper bound on any single wait.
    pub max_backoff: Duration,

    /// Growth factor applied per attempt.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Returns the wait after attempt `attempt` (0-indexed) fails.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let nanos = self.initial_backoff.as_nanos() as f64 * self.multiplier.powi(exponent);
        let cap = self.max_backoff.as_nanos() as f64;
        if !nanos.is_finite() || nanos >= cap {
            self.max_backoff
        } else {
            Duration::from_nanos(nanos as u64)
        }
    }
}

fn response_is_retryable(response: &Response) -> bool {
    response
        .error()
        .is_some_and(|e| e.retryable || e.code.is_transient())
}

/// Decides whether a failed result may be re-attempted.
pub fn is_retryable(result: &HandlerResult) -> bool {
    match result {
        Ok(response) => !response.is_success() && response_is_retryable(response),
        Err(e) if e.is_cancellation() => false,
        Err(e) => e.response().map_or(true, response_is_retryable),
    }
}

/// Middleware that re-invokes downstream on transient failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryMiddleware {
    policy: RetryPolicy,
}

impl RetryMiddleware {
    /// Creates a retry stage with the given policy.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy.
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

fn exhausted(result: HandlerResult, retries: u32) -> HandlerResult {
    if retries == 0 {
        return result;
    }
    match result {
        Ok(mut response) => {
            if let Some(error) = response.error_mut() {
                error.message = format!("{} (after {retries} retries)", error.message);
            }
            Ok(response)
        }
        Err(source) => Err(HandlerError::RetriesExhausted {
            retries,
            source: Box::new(source),
        }),
    }
}

impl Middleware for RetryMiddleware {
    fn name(&self) -> &'static str {
        "retry"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                let result = next.run(scope, request.clone()).await;

                if matches!(&result, Ok(response) if response.is_success()) {
                    return result;
                }
                if !is_retryable(&result) {
                    return result;
                }
                if attempt >= self.policy.max_attempts {
                    warn!(
                        request_id = scope.request_id().unwrap_or_default(),
                        retries = attempt,
                        "retries exhausted"
                    );
                    return exhausted(result, attempt);
                }

                let delay = self.policy.backoff(attempt);
                debug!(
                    request_id = scope.request_id().unwrap_or_default(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after backoff"
                );

                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    cause = scope.cancelled() => {
                        return Err(HandlerError::from_cause(
                            cause,
                            Response::failure(
                                ErrorCode::Cancelled,
                                format!("retry aborted after {} attempts", attempt + 1),
                                false,
                            ),
                        ));
                    }
                }
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::fixtures::{EchoUseCase, ErroringUseCase, FailingUseCase, FlakyUseCase};
    use conduit_core::{FnUseCase, UseCase};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2.0,
        }
    }

    fn chain(policy: RetryPolicy, use_case: Arc<dyn UseCase>) -> Next {
        Next::new(Arc::new(RetryMiddleware::new(policy)), Next::endpoint(use_case))
    }

    async fn run(next: &Next) -> HandlerResult {
        next.run(&RequestScope::new(), Request::new("t", "{}")).await
    }

    #[test]
    fn test_backoff_formula() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_millis(10));
        assert_eq!(p.backoff(1), Duration::from_millis(20));
        assert_eq!(p.backoff(2), Duration::from_millis(40));
        assert_eq!(p.backoff(3), Duration::from_millis(50));
        assert_eq!(p.backoff(500), Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_not_retried() {
        let echo = Arc::new(EchoUseCase::new());
        let response = run(&chain(policy(3), echo.clone())).await.unwrap();
        assert!(response.is_success());
        assert_eq!(echo.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flaky_recovers_within_budget() {
        let flaky = Arc::new(FlakyUseCase::new(2));
        let response = run(&chain(policy(3), flaky.clone())).await.unwrap();
        assert!(response.is_success());
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_code_stops_immediately() {
        let failing = Arc::new(FailingUseCase::new(ErrorCode::Validation, false));
        let response = run(&chain(policy(3), failing.clone())).await.unwrap();
        assert_eq!(failing.calls(), 1);
        assert!(!response.error().unwrap().message.contains("retries"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_code_is_retried_without_flag() {
        let failing = Arc::new(FailingUseCase::new("SERVICE_UNAVAILABLE", false));
        let response = run(&chain(policy(2), failing.clone())).await.unwrap();
        assert_eq!(failing.calls(), 3);
        assert!(response.error().unwrap().message.ends_with("(after 2 retries)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bare_errors_are_retried_then_wrapped() {
        let erroring = Arc::new(ErroringUseCase::new());
        let err = run(&chain(policy(2), erroring.clone())).await.unwrap_err();
        assert_eq!(erroring.calls(), 3);
        assert!(matches!(err, HandlerError::RetriesExhausted { retries: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_errors_are_not_retried() {
        let calls = Arc::new(Mutex::new(0_u32));
        let counter = Arc::clone(&calls);
        let use_case = FnUseCase::new(move |_scope: RequestScope, _request: Request| {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock() += 1;
                Err(HandlerError::cancelled())
            }
        });
        let err = run(&chain(policy(3), Arc::new(use_case))).await.unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(*calls.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_follow_backoff_schedule() {
        let stamps = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&stamps);
        let use_case = FnUseCase::new(move |_scope: RequestScope, _request: Request| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().push(Instant::now());
                Ok(Response::failure(ErrorCode::Temporary, "again", true))
            }
        });

        run(&chain(policy(4), Arc::new(use_case))).await.unwrap();

        let stamps = stamps.lock();
        let gaps: Vec<_> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(50),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_returns_cancelled() {
        let failing = Arc::new(FailingUseCase::new(ErrorCode::Temporary, true));
        let slow_policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(30),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
        };
        let next = chain(slow_policy, failing.clone());

        let scope = RequestScope::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let err = next.run(&scope, Request::new("t", "{}")).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(err, HandlerError::Cancelled { .. }));
        assert_eq!(
            err.response().unwrap().error_code(),
            Some(&ErrorCode::Cancelled)
        );
        assert_eq!(failing.calls(), 1);
    }

    proptest! {
        #[test]
        fn prop_calls_bounded_by_max_attempts(max_attempts in 0_u32..6) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let failing = Arc::new(FailingUseCase::new(ErrorCode::Temporary, true));
            runtime.block_on(async {
                let _ = run(&chain(policy(max_attempts), failing.clone())).await;
            });
            prop_assert_eq!(failing.calls(), max_attempts + 1);
        }

        #[test]
        fn prop_backoff_matches_formula(
            initial_ms in 1_u64..1000,
            max_ms in 1_u64..100_000,
            multiplier in 1_u32..4,
            attempt in 0_u32..12,
        ) {
            let p = RetryPolicy {
                max_attempts: 12,
                initial_backoff: Duration::from_millis(initial_ms),
                max_backoff: Duration::from_millis(max_ms),
                multiplier: f64::from(multiplier),
            };
            let expected_ms = (u128::from(initial_ms) * u128::from(multiplier).pow(attempt))
                .min(u128::from(max_ms));
            prop_assert_eq!(p.backoff(attempt).as_millis(), expected_ms);
        }
    }
}
