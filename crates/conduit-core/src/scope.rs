//! Request-scoped cancellation and metadata.
//!
//! [`RequestScope`] travels alongside a [`Request`](crate::Request) through
//! the middleware chain. It carries a cancellation token, an optional
//! deadline, and the correlation identifiers middleware attach on the way
//! in. Scopes derived with [`child`](RequestScope::child) or
//! [`with_timeout`](RequestScope::with_timeout) are cancelled whenever their
//! parent is; cancelling a child never affects the parent.

use crate::error::HandlerError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a scope stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    /// The scope (or an ancestor) was cancelled explicitly.
    Cancelled,
    /// The scope's deadline elapsed.
    DeadlineExceeded,
}

/// Cancellation, deadline and correlation metadata for one request.
///
/// # Example
///
/// ```
/// use conduit_core::RequestScope;
/// use std::time::Duration;
///
/// let root = RequestScope::new();
/// let child = root.with_timeout(Duration::from_secs(5));
///
/// root.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestScope {
    token: CancellationToken,
    deadline: Option<Instant>,
    request_id: Option<String>,
    worker_name: Option<String>,
    platform: Option<String>,
    trace_id: Option<String>,
    span_id: Option<String>,
}

impl RequestScope {
    /// Creates a root scope with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a root scope driven by an existing cancellation token.
    ///
    /// Adapters use this to tie request processing to their shutdown signal.
    #[must_use]
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// Derives a child scope that shares this scope's deadline and metadata.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            ..self.clone()
        }
    }

    /// Derives a child scope whose deadline is at most `timeout` from now.
    ///
    /// An earlier deadline inherited from this scope is kept.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            deadline: Some(deadline),
            ..self.child()
        }
    }

    /// Cancels this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns why the scope has stopped, or `None` while it is live.
    pub fn cause(&self) -> Option<CancelCause> {
        if self.token.is_cancelled() {
            Some(CancelCause::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelCause::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Returns `true` once the scope is cancelled or past its deadline.
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Completes when the scope is cancelled or its deadline elapses.
    pub async fn cancelled(&self) -> CancelCause {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => CancelCause::Cancelled,
                    () = tokio::time::sleep_until(deadline) => CancelCause::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelCause::Cancelled
            }
        }
    }

    /// Returns the error describing why the scope stopped, if it has.
    pub fn error(&self) -> Option<HandlerError> {
        self.cause().map(|cause| match cause {
            CancelCause::Cancelled => HandlerError::cancelled(),
            CancelCause::DeadlineExceeded => HandlerError::deadline_exceeded("deadline exceeded"),
        })
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Sets the request identifier.
    pub fn set_request_id(&mut self, id: impl Into<String>) {
        self.request_id = Some(id.into());
    }

    /// Returns the worker name.
    pub fn worker_name(&self) -> Option<&str> {
        self.worker_name.as_deref()
    }

    /// Sets the worker name.
    pub fn set_worker_name(&mut self, name: impl Into<String>) {
        self.worker_name = Some(name.into());
    }

    /// Returns the platform tag.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// Sets the platform tag.
    pub fn set_platform(&mut self, platform: impl Into<String>) {
        self.platform = Some(platform.into());
    }

    /// Returns the trace identifier.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Sets the trace identifier.
    pub fn set_trace_id(&mut self, trace_id: impl Into<String>) {
        self.trace_id = Some(trace_id.into());
    }

    /// Returns the span identifier.
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Sets the span identifier.
    pub fn set_span_id(&mut self, span_id: impl Into<String>) {
        self.span_id = Some(span_id.into());
    }
}
