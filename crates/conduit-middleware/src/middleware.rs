//! Core middleware trait and chain types.
//!
//! A [`Middleware`] wraps the rest of the chain: it receives the request
//! scope, the request, and a [`Next`] handle for everything downstream. It
//! may act before and after calling [`Next::run`], call it more than once
//! (retry), move it onto another task (timeout), or not call it at all
//! (validation rejecting a request).
//!
//! # Example
//!
//! ```
//! use conduit_middleware::{BoxFuture, Middleware, Next};
//! use conduit_core::{HandlerResult, Request, RequestScope};
//!
//! struct Stamp;
//!
//! impl Middleware for Stamp {
//!     fn name(&self) -> &'static str {
//!         "stamp"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         scope: &'a RequestScope,
//!         mut request: Request,
//!         next: &'a Next,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             request.metadata.insert("stamped".into(), "yes".into());
//!             next.run(scope, request).await
//!         })
//!     }
//! }
//! ```

use conduit_core::{HandlerResult, Request, RequestScope, UseCase};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A link in the handler chain.
///
/// # Invariants
///
/// - Middleware MUST NOT let a malformed request or a panic escape as
///   anything other than a [`HandlerResult`], unless it is re-raising a panic
///   for an outer recovery stage
/// - Middleware SHOULD forward the scope it was given (or a child of it) so
///   cancellation keeps flowing downward
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Processes the request, usually by delegating to `next`.
    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Handle to the remainder of the chain.
///
/// `Next` is cheap to clone and `'static`, so middleware can hand it to a
/// spawned task or invoke it repeatedly.
#[derive(Clone)]
pub struct Next {
    inner: NextInner,
}

#[derive(Clone)]
enum NextInner {
    /// More middleware to run.
    Chain {
        middleware: Arc<dyn Middleware>,
        next: Arc<Next>,
    },
    /// End of the chain: the use case.
    Endpoint(Arc<dyn UseCase>),
}

impl Next {
    /// Wraps `next` with `middleware`.
    pub(crate) fn new(middleware: Arc<dyn Middleware>, next: Next) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Arc::new(next),
            },
        }
    }

    /// Creates the terminal link that invokes the use case.
    pub fn endpoint(use_case: Arc<dyn UseCase>) -> Self {
        Self {
            inner: NextInner::Endpoint(use_case),
        }
    }

    /// Runs the remainder of the chain.
    pub fn run<'a>(&'a self, scope: &'a RequestScope, request: Request) -> BoxFuture<'a, HandlerResult> {
        match &self.inner {
            NextInner::Chain { middleware, next } => middleware.process(scope, request, next),
            NextInner::Endpoint(use_case) => use_case.execute(scope, request),
        }
    }
}

impl std::fmt::Debug for Next {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            NextInner::Chain { middleware, .. } => {
                f.debug_tuple("Next::Chain").field(&middleware.name()).finish()
            }
            NextInner::Endpoint(_) => f.write_str("Next::Endpoint"),
        }
    }
}

/// A middleware built from an async closure.
///
/// The closure receives owned clones of the scope and `Next`.
///
/// # Example
///
/// ```
/// use conduit_middleware::FnMiddleware;
///
/// let tag = FnMiddleware::new("tag", |scope, mut request, next| async move {
///     request.metadata.insert("tagged".into(), "true".into());
///     next.run(&scope, request).await
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub fn new<Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(RequestScope, Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { name, func }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(RequestScope, Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin((self.func)(scope.clone(), request, next.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::fixtures::EchoUseCase;
    use conduit_core::Response;

    struct Tagging {
        name: &'static str,
    }

    impl Middleware for Tagging {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            scope: &'a RequestScope,
            mut request: Request,
            next: &'a Next,
        ) -> BoxFuture<'a, HandlerResult> {
            Box::pin(async move {
                request
                    .metadata
                    .entry("visited".to_string())
                    .or_default()
                    .push_str(self.name);
                next.run(scope, request).await
            })
        }
    }

    #[tokio::test]
    async fn test_endpoint_runs_use_case() {
        let next = Next::endpoint(Arc::new(EchoUseCase::new()));
        let response = next
            .run(&RequestScope::new(), Request::new("echo", "[1]"))
            .await
            .unwrap();
        assert_eq!(response.data().unwrap().as_ref(), b"[1]");
    }

    #[tokio::test]
    async fn test_chain_order() {
        let echo = Arc::new(EchoUseCase::new());
        let endpoint = Next::endpoint(echo.clone());
        let inner = Next::new(Arc::new(Tagging { name: "b" }), endpoint);
        let outer = Next::new(Arc::new(Tagging { name: "a" }), inner);

        outer
            .run(&RequestScope::new(), Request::new("echo", "{}"))
            .await
            .unwrap();

        assert_eq!(echo.seen()[0].metadata("visited"), Some("ab"));
    }

    #[tokio::test]
    async fn test_fn_middleware_short_circuit() {
        let echo = Arc::new(EchoUseCase::new());
        let deny = FnMiddleware::new("deny", |_scope, _request, _next| async move {
            Ok(Response::failure("FORBIDDEN", "nope", false))
        });
        assert_eq!(deny.name(), "deny");

        let next = Next::new(Arc::new(deny), Next::endpoint(echo.clone()));
        let response = next
            .run(&RequestScope::new(), Request::new("echo", "{}"))
            .await
            .unwrap();

        assert!(!response.is_success());
        assert_eq!(echo.calls(), 0);
    }

    #[test]
    fn test_debug_names_stage() {
        let next = Next::new(
            Arc::new(Tagging { name: "x" }),
            Next::endpoint(Arc::new(EchoUseCase::new())),
        );
        assert_eq!(format!("{next:?}"), "Next::Chain(\"x\")");
    }
}
