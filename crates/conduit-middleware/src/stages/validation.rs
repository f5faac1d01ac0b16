//! Request normalization and validation.
//!
//! Runs before anything that depends on a well-formed request:
//!
//! 1. Assigns a UUID v7 id if the request has none
//! 2. Stamps the current UTC time if the timestamp is unset
//! 3. Rejects an empty `type`, an empty payload, or a payload that is not
//!    valid JSON with a non-retryable `VALIDATION_ERROR` response
//!
//! Rejection is a normal response, not an error, and the rest of the chain
//! never runs.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{ErrorCode, HandlerResult, Request, RequestScope, Response};
use tracing::debug;

/// Middleware that normalizes requests and rejects malformed ones.
#[derive(Debug, Clone)]
pub struct ValidationMiddleware {
    allow_empty_payload: bool,
}

impl Default for ValidationMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationMiddleware {
    /// Creates a validator that requires a JSON payload.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allow_empty_payload: false,
        }
    }

    /// Accepts requests with an empty payload.
    ///
    /// Non-empty payloads must still be valid JSON.
    #[must_use]
    pub const fn allow_empty_payload(mut self, allow: bool) -> Self {
        self.allow_empty_payload = allow;
        self
    }

    /// Returns the reason `request` is rejected, if it is.
    pub fn check(&self, request: &Request) -> Option<&'static str> {
        if request.request_type.trim().is_empty() {
            return Some("request type is required");
        }
        if request.payload.is_empty() {
            return (!self.allow_empty_payload).then_some("request payload is required");
        }
        if !request.payload_is_json() {
            return Some("request payload is not valid JSON");
        }
        None
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        mut request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            request.normalize();

            if let Some(reason) = self.check(&request) {
                debug!(request_id = %request.id, reason, "request rejected by validation");
                return Ok(Response::failure(ErrorCode::Validation, reason, false)
                    .with_metadata("request_id", request.id));
            }

            if scope.request_id() == Some(request.id.as_str()) {
                next.run(scope, request).await
            } else {
                let mut scope = scope.clone();
                scope.set_request_id(request.id.clone());
                next.run(&scope, request).await
            }
        })
    }
}
