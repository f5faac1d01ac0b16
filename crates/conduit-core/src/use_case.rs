//! The business-logic contract.

use crate::error::{HandlerError, HandlerResult};
use crate::request::Request;
use crate::scope::RequestScope;
use async_trait::async_trait;
use std::future::Future;

/// Business logic invoked at the innermost position of the middleware chain.
///
/// A use case is written once against [`Request`]/[`Response`](crate::Response)
/// and runs unchanged behind every adapter. It should observe
/// [`RequestScope::cancelled`] when it performs long waits; work that ignores
/// the scope keeps running after a timeout abandons it.
///
/// # Example
///
/// ```
/// use conduit_core::{async_trait, HandlerResult, Request, RequestScope, Response, UseCase};
///
/// struct Echo;
///
/// #[async_trait]
/// impl UseCase for Echo {
///     async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
///         Ok(Response::success(request.payload))
///     }
/// }
/// ```
#[async_trait]
pub trait UseCase: Send + Sync + 'static {
    /// Processes one request.
    async fn execute(&self, scope: &RequestScope, request: Request) -> HandlerResult;

    /// Reports whether the use case and its dependencies are healthy.
    async fn health_check(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A use case built from an async closure.
///
/// The closure receives an owned clone of the scope so the returned future
/// does not borrow from the caller.
///
/// # Example
///
/// ```
/// use conduit_core::{FnUseCase, Response};
///
/// let echo = FnUseCase::new(|_scope, request| async move {
///     Ok(Response::success(request.payload))
/// });
/// ```
pub struct FnUseCase<F> {
    func: F,
}

impl<F> FnUseCase<F> {
    /// Creates a use case from a closure.
    pub fn new<Fut>(func: F) -> Self
    where
        F: Fn(RequestScope, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> UseCase for FnUseCase<F>
where
    F: Fn(RequestScope, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn execute(&self, scope: &RequestScope, request: Request) -> HandlerResult {
        (self.func)(scope.clone(), request).await
    }
}
