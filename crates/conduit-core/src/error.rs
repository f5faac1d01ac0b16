//! Handler error type.
//!
//! A handler reports failures in two ways. A failed [`Response`] is the
//! normal channel: the use case or a middleware decided the outcome. A
//! [`HandlerError`] signals that processing did not complete normally
//! (deadline, cancellation, panic, or an unclassified use-case error).
//! Errors produced by the framework itself carry the [`Response`] that was
//! manufactured for the caller so adapters can still render it.

use crate::code::ErrorCode;
use crate::response::Response;
use crate::scope::CancelCause;
use thiserror::Error;

/// Result type returned by handlers, middleware and use cases.
pub type HandlerResult = Result<Response, HandlerError>;

/// Errors returned from request handling.
///
/// # Example
///
/// ```
/// use conduit_core::{ErrorCode, HandlerError};
///
/// let err = HandlerError::cancelled();
/// assert!(err.is_cancellation());
/// assert_eq!(err.response().unwrap().error_code(), Some(&ErrorCode::Cancelled));
///
/// let bare = HandlerError::use_case("database unreachable");
/// assert!(bare.response().is_none());
/// ```
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The request deadline elapsed before processing finished.
    #[error("deadline exceeded")]
    DeadlineExceeded {
        /// The `TIMEOUT` response reported to the caller.
        response: Box<Response>,
    },

    /// Processing was cancelled by an outer scope.
    #[error("request cancelled")]
    Cancelled {
        /// The `CANCELLED` response reported to the caller.
        response: Box<Response>,
    },

    /// Downstream code panicked and the panic was contained.
    #[error("panic recovered: {message}")]
    Panic {
        /// The panic payload rendered as text.
        message: String,
        /// The `INTERNAL_ERROR` response reported to the caller.
        response: Box<Response>,
    },

    /// Every retry attempt failed with an error.
    #[error("retries exhausted after {retries} retries: {source}")]
    RetriesExhausted {
        /// Number of retries performed after the first attempt.
        retries: u32,
        /// The error returned by the last attempt.
        #[source]
        source: Box<HandlerError>,
    },

    /// A failure raised by business code without a response.
    #[error("{message}")]
    UseCase {
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl HandlerError {
    /// Creates a deadline error carrying a retryable `TIMEOUT` response.
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            response: Box::new(Response::failure(ErrorCode::Timeout, message, true)),
        }
    }

    /// Creates a cancellation error carrying a `CANCELLED` response.
    pub fn cancelled() -> Self {
        Self::Cancelled {
            response: Box::new(Response::failure(
                ErrorCode::Cancelled,
                "request cancelled",
                false,
            )),
        }
    }

    /// Creates a recovered-panic error carrying a non-retryable `INTERNAL_ERROR` response.
    pub fn panic(message: impl Into<String>) -> Self {
        let message = message.into();
        let response = Response::failure(
            ErrorCode::Internal,
            format!("panic recovered: {message}"),
            false,
        );
        Self::Panic {
            message,
            response: Box::new(response),
        }
    }

    /// Creates the error matching a scope's cancel cause, carrying `response`.
    pub fn from_cause(cause: CancelCause, response: Response) -> Self {
        let response = Box::new(response);
        match cause {
            CancelCause::Cancelled => Self::Cancelled { response },
            CancelCause::DeadlineExceeded => Self::DeadlineExceeded { response },
        }
    }

    /// Creates a bare use-case error.
    pub fn use_case(message: impl Into<String>) -> Self {
        Self::UseCase {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error as a bare use-case error.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::UseCase {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Returns `true` for deadline and cancellation errors.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. } | Self::Cancelled { .. })
    }

    /// Returns the response manufactured alongside this error, if any.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::DeadlineExceeded { response }
            | Self::Cancelled { response }
            | Self::Panic { response, .. } => Some(&**response),
            Self::RetriesExhausted { source, .. } => source.response(),
            Self::UseCase { .. } => None,
        }
    }

    /// Returns the attached response mutably, if any.
    pub fn response_mut(&mut self) -> Option<&mut Response> {
        match self {
            Self::DeadlineExceeded { response }
            | Self::Cancelled { response }
            | Self::Panic { response, .. } => Some(&mut **response),
            Self::RetriesExhausted { source, .. } => source.response_mut(),
            Self::UseCase { .. } => None,
        }
    }

    /// Converts this error into the response reported to callers.
    ///
    /// Errors without an attached response become a non-retryable
    /// `INTERNAL_ERROR` response carrying the error message.
    pub fn into_response(self) -> Response {
        match self {
            Self::DeadlineExceeded { response }
            | Self::Cancelled { response }
            | Self::Panic { response, .. } => *response,
            Self::RetriesExhausted { source, .. } => source.into_response(),
            other @ Self::UseCase { .. } => {
                Response::failure(ErrorCode::Internal, other.to_string(), false)
            }
        }
    }
}
