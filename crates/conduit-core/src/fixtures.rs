//! Use-case fixtures for tests across the Conduit workspace.
//!
//! Every fixture counts its invocations so tests can assert how often the
//! middleware chain reached the use case.
//!
//! # Example
//!
//! ```
//! use conduit_core::fixtures::FlakyUseCase;
//!
//! // Fails twice with a retryable error, then succeeds.
//! let flaky = FlakyUseCase::new(2);
//! assert_eq!(flaky.calls(), 0);
//! ```

use crate::code::ErrorCode;
use crate::error::{HandlerError, HandlerResult};
use crate::request::Request;
use crate::response::Response;
use crate::scope::RequestScope;
use crate::use_case::UseCase;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

/// Echoes the request payload back as response data.
#[derive(Debug, Default)]
pub struct EchoUseCase {
    calls: AtomicU32,
    seen: Mutex<Vec<Request>>,
}

impl EchoUseCase {
    /// Creates a new echo use case.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the use case ran.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the requests the use case received, in order.
    pub fn seen(&self) -> Vec<Request> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl UseCase for EchoUseCase {
    async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = request.payload.clone();
        self.seen.lock().push(request);
        Ok(Response::success(data))
    }
}

/// Always returns a failed response with a fixed code.
#[derive(Debug)]
pub struct FailingUseCase {
    code: ErrorCode,
    retryable: bool,
    calls: AtomicU32,
}

impl FailingUseCase {
    /// Creates a use case that fails with `code`.
    pub fn new(code: impl Into<ErrorCode>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            retryable,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns how many times the use case ran.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UseCase for FailingUseCase {
    async fn execute(&self, _scope: &RequestScope, _request: Request) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Response::failure(
            self.code.clone(),
            format!("{} failure", self.code),
            self.retryable,
        ))
    }
}

/// Always returns a bare error without a response.
#[derive(Debug, Default)]
pub struct ErroringUseCase {
    calls: AtomicU32,
}

impl ErroringUseCase {
    /// Creates a new erroring use case.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many times the use case ran.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UseCase for ErroringUseCase {
    async fn execute(&self, _scope: &RequestScope, _request: Request) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::use_case("connection reset by peer"))
    }
}

/// Panics on every call.
#[derive(Debug)]
pub struct PanickingUseCase {
    message: &'static str,
}

impl PanickingUseCase {
    /// Creates a use case that panics with `message`.
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self { message }
    }
}

#[async_trait]
impl UseCase for PanickingUseCase {
    async fn execute(&self, _scope: &RequestScope, _request: Request) -> HandlerResult {
        panic!("{}", self.message);
    }
}

/// Sleeps for a fixed delay without observing cancellation, then echoes.
#[derive(Debug)]
pub struct SleepingUseCase {
    delay: Duration,
    completed: AtomicBool,
}

impl SleepingUseCase {
    /// Creates a use case that sleeps for `delay`.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            completed: AtomicBool::new(false),
        }
    }

    /// Returns `true` once a call ran to completion.
    pub fn completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UseCase for SleepingUseCase {
    async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
        tokio::time::sleep(self.delay).await;
        self.completed.store(true, Ordering::SeqCst);
        Ok(Response::success(request.payload))
    }
}

/// Fails with a retryable `TEMPORARY_ERROR` a fixed number of times, then succeeds.
#[derive(Debug)]
pub struct FlakyUseCase {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyUseCase {
    /// Creates a use case that fails `failures` times before succeeding.
    #[must_use]
    pub const fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    /// Returns how many times the use case ran.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UseCase for FlakyUseCase {
    async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Ok(Response::failure(
                ErrorCode::Temporary,
                "dependency warming up",
                true,
            ));
        }
        Ok(Response::success(request.payload))
    }
}

/// Succeeds on every request but reports itself unhealthy.
#[derive(Debug, Default)]
pub struct UnhealthyUseCase;

#[async_trait]
impl UseCase for UnhealthyUseCase {
    async fn execute(&self, _scope: &RequestScope, request: Request) -> HandlerResult {
        Ok(Response::success(request.payload))
    }

    async fn health_check(&self) -> Result<(), HandlerError> {
        Err(HandlerError::use_case("database unreachable"))
    }
}
