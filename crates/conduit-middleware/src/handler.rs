//! The handler: an ordered middleware chain terminating in a use case.
//!
//! Middleware are registered outermost first. Building the chain wraps them
//! in reverse registration order, so for `[A, B]` a successful call runs
//! `A-before → B-before → use case → B-after → A-after`.
//!
//! The default stack, outermost to innermost, is described by
//! [`Stage::default_order`]: recovery, timeout, tracing, metrics, logging,
//! validation, retry.

use crate::middleware::{Middleware, Next};
use conduit_core::{HandlerError, HandlerResult, Request, RequestScope, UseCase};
use std::sync::Arc;
use std::time::Duration;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The built-in middleware stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Contains panics raised downstream.
    Recovery,
    /// Bounds downstream processing time.
    Timeout,
    /// Propagates or creates trace identifiers.
    Tracing,
    /// Records request metrics.
    Metrics,
    /// Logs request start and completion.
    Logging,
    /// Normalizes and validates the request.
    Validation,
    /// Retries transient failures with backoff.
    Retry,
}

impl Stage {
    /// Returns the stages in default registration order (outermost first).
    #[must_use]
    pub const fn default_order() -> [Stage; 7] {
        [
            Self::Recovery,
            Self::Timeout,
            Self::Tracing,
            Self::Metrics,
            Self::Logging,
            Self::Validation,
            Self::Retry,
        ]
    }

    /// Returns the stage name used by the corresponding middleware.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Recovery => "recovery",
            Self::Timeout => "timeout",
            Self::Tracing => "tracing",
            Self::Metrics => "metrics",
            Self::Logging => "logging",
            Self::Validation => "validation",
            Self::Retry => "retry",
        }
    }
}

/// An executable middleware chain bound to one use case.
///
/// A `Handler` is immutable once built and safe to share across tasks; clone
/// it or wrap it in an `Arc` to hand it to an adapter.
///
/// # Example
///
/// ```
/// use conduit_core::fixtures::EchoUseCase;
/// use conduit_core::{Request, RequestScope};
/// use conduit_middleware::stages::{RetryMiddleware, RetryPolicy, ValidationMiddleware};
/// use conduit_middleware::Handler;
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let handler = Handler::builder(Arc::new(EchoUseCase::new()))
///     .middleware(ValidationMiddleware::new())
///     .middleware(RetryMiddleware::new(RetryPolicy::none()))
///     .build();
///
/// let response = handler
///     .handle(&RequestScope::new(), Request::new("echo", r#"{"x":1}"#))
///     .await
///     .unwrap();
/// assert!(response.is_success());
/// # }
/// ```
#[derive(Clone)]
pub struct Handler {
    chain: Next,
    use_case: Arc<dyn UseCase>,
    names: Vec<&'static str>,
    worker_name: String,
    platform: String,
    timeout: Option<Duration>,
}

impl Handler {
    /// Creates a builder for a handler around `use_case`.
    pub fn builder(use_case: Arc<dyn UseCase>) -> HandlerBuilder {
        HandlerBuilder::new(use_case)
    }

    /// Runs one request through the chain.
    ///
    /// Derives a child scope (bounded by the handler timeout when one is
    /// configured) carrying the request id, worker name and platform, then
    /// invokes the outermost middleware. Panics are not caught here; that is
    /// the recovery stage's job.
    pub async fn handle(&self, scope: &RequestScope, request: Request) -> HandlerResult {
        let mut scope = match self.timeout {
            Some(timeout) => scope.with_timeout(timeout),
            None => scope.child(),
        };
        if !request.id.is_empty() {
            scope.set_request_id(request.id.clone());
        }
        scope.set_worker_name(self.worker_name.clone());
        scope.set_platform(self.platform.clone());

        self.chain.run(&scope, request).await
    }

    /// Runs the use case's health probe, bypassing the chain.
    pub async fn health_check(&self) -> Result<(), HandlerError> {
        self.use_case.health_check().await
    }

    /// Returns middleware names, outermost first.
    pub fn middleware_names(&self) -> &[&'static str] {
        &self.names
    }

    /// Returns the worker name.
    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    /// Returns the platform tag.
    pub fn platform(&self) -> &str {
        &self.platform
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("middleware", &self.names)
            .field("worker_name", &self.worker_name)
            .field("platform", &self.platform)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Handler`].
pub struct HandlerBuilder {
    use_case: Arc<dyn UseCase>,
    stages: Vec<BoxedMiddleware>,
    worker_name: String,
    platform: String,
    timeout: Option<Duration>,
}

impl HandlerBuilder {
    /// Creates a builder with no middleware.
    pub fn new(use_case: Arc<dyn UseCase>) -> Self {
        Self {
            use_case,
            stages: Vec::new(),
            worker_name: "conduit-worker".to_string(),
            platform: "unknown".to_string(),
            timeout: None,
        }
    }

    /// Appends a middleware. The first one added becomes the outermost.
    #[must_use]
    pub fn middleware<M: Middleware>(self, middleware: M) -> Self {
        self.boxed(Arc::new(middleware))
    }

    /// Appends an already boxed middleware.
    #[must_use]
    pub fn boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Sets the worker name injected into every scope.
    #[must_use]
    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Sets the platform tag injected into every scope.
    #[must_use]
    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    /// Bounds the scope handed to the chain by `timeout`.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the chain.
    #[must_use]
    pub fn build(self) -> Handler {
        let names = self.stages.iter().map(|mw| mw.name()).collect();

        let mut next = Next::endpoint(Arc::clone(&self.use_case));
        for middleware in self.stages.into_iter().rev() {
            next = Next::new(middleware, next);
        }

        Handler {
            chain: next,
            use_case: self.use_case,
            names,
            worker_name: self.worker_name,
            platform: self.platform,
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{BoxFuture, FnMiddleware};
    use conduit_core::fixtures::{EchoUseCase, UnhealthyUseCase};
    use conduit_core::{FnUseCase, Response};
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            scope: &'a RequestScope,
            request: Request,
            next: &'a Next,
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                self.log.lock().push(format!("{}-before", self.name));
                let result = next.run(scope, request).await;
                self.log.lock().push(format!("{}-after", self.name));
                result
            })
        }
    }

    #[tokio::test]
    async fn test_registration_order_is_outermost_first() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let core_log = Arc::clone(&log);
        let use_case = FnUseCase::new(move |_scope: RequestScope, request: Request| {
            let log = Arc::clone(&core_log);
            async move {
                log.lock().push("core".to_string());
                Ok(Response::success(request.payload))
            }
        });

        let handler = Handler::builder(Arc::new(use_case))
            .middleware(Recorder { name: "A", log: Arc::clone(&log) })
            .middleware(Recorder { name: "B", log: Arc::clone(&log) })
            .build();

        handler
            .handle(&RequestScope::new(), Request::new("t", "{}"))
            .await
            .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["A-before", "B-before", "core", "B-after", "A-after"]
        );
        assert_eq!(handler.middleware_names(), &["A", "B"]);
    }

    #[tokio::test]
    async fn test_handle_injects_scope_metadata() {
        let inspect = FnMiddleware::new("inspect", |scope: RequestScope, request: Request, next: Next| async move {
            assert_eq!(scope.request_id(), Some("req-7"));
            assert_eq!(scope.worker_name(), Some("billing"));
            assert_eq!(scope.platform(), Some("sqs"));
            next.run(&scope, request).await
        });

        let handler = Handler::builder(Arc::new(EchoUseCase::new()))
            .middleware(inspect)
            .worker_name("billing")
            .platform("sqs")
            .build();

        let response = handler
            .handle(&RequestScope::new(), Request::new("t", "{}").with_id("req-7"))
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_sets_deadline() {
        let inspect = FnMiddleware::new("inspect", |scope: RequestScope, request: Request, next: Next| async move {
            assert!(scope.remaining().unwrap() <= Duration::from_secs(2));
            next.run(&scope, request).await
        });

        let handler = Handler::builder(Arc::new(EchoUseCase::new()))
            .middleware(inspect)
            .timeout(Duration::from_secs(2))
            .build();

        handler
            .handle(&RequestScope::new(), Request::new("t", "{}"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_echo_through_validation_and_single_attempt_retry() {
        use crate::stages::{RetryMiddleware, RetryPolicy, ValidationMiddleware};

        let echo = Arc::new(EchoUseCase::new());
        let handler = Handler::builder(echo.clone())
            .middleware(ValidationMiddleware::new())
            .middleware(RetryMiddleware::new(RetryPolicy::none()))
            .build();

        let response = handler
            .handle(&RequestScope::new(), Request::new("echo", r#"{"x":1}"#))
            .await
            .unwrap();

        assert!(response.is_success());
        assert!(response.error().is_none());
        assert_eq!(response.data().unwrap().as_ref(), br#"{"x":1}"#);

        assert_eq!(echo.calls(), 1);
        let seen = echo.seen();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].id.is_empty());
        assert!(seen[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_health_check_bypasses_chain() {
        let handler = Handler::builder(Arc::new(UnhealthyUseCase)).build();
        assert!(handler.health_check().await.is_err());
    }

    #[test]
    fn test_default_stage_order() {
        let names: Vec<_> = Stage::default_order().iter().map(Stage::name).collect();
        assert_eq!(
            names,
            vec!["recovery", "timeout", "tracing", "metrics", "logging", "validation", "retry"]
        );
    }
}
