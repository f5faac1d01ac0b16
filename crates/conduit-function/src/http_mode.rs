//! HTTP-compatibility mode.
//!
//! The HTTP request is turned into the same environment a watchdog would
//! expose, so translation is identical to the stdin/stdout path. Any
//! method is accepted; health paths answer from the use case's probe.

use bytes::Bytes;
use conduit_core::{ErrorCode, RequestScope};
use conduit_server::health::{self, is_health_path};
use conduit_server::translate::{self, HttpResponse};
use conduit_server::HttpHandler;
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};

use crate::adapter::FunctionAdapter;
use crate::env::FunctionEnv;
use crate::translate::request_from_input;

/// The function adapter behind an HTTP listener.
#[derive(Debug, Clone)]
pub struct FunctionHttp {
    adapter: FunctionAdapter,
    max_request_size: usize,
}

impl FunctionHttp {
    /// Wraps `adapter`, rejecting bodies larger than `max_request_size`.
    pub fn new(adapter: FunctionAdapter, max_request_size: usize) -> Self {
        Self {
            adapter,
            max_request_size,
        }
    }

    /// Handles one HTTP request.
    pub async fn handle<B>(&self, request: http::Request<B>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if is_health_path(request.uri().path()) {
            return health::respond(self.adapter.handler()).await;
        }

        let (parts, body) = request.into_parts();
        let env = FunctionEnv::from_http_parts(&parts);

        let input = match Limited::new(body, self.max_request_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                let request_id = request_from_input(b"", &env, self.adapter.settings()).id;
                let message = if e.is::<LengthLimitError>() {
                    format!("request body exceeds {} bytes", self.max_request_size)
                } else {
                    format!("failed to read request body: {e}")
                };
                tracing::warn!(request_id, reason = %message, "rejecting function request");
                return translate::error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidRequest,
                    message,
                    &request_id,
                );
            }
        };

        let request = request_from_input(&input, &env, self.adapter.settings());
        let request_id = request.id.clone();
        let result = self
            .adapter
            .handler()
            .handle(&RequestScope::new(), request)
            .await;
        translate::result_response(result, &request_id)
    }
}

impl HttpHandler for FunctionHttp {
    async fn call(&self, request: http::Request<Incoming>) -> HttpResponse {
        self.handle(request).await
    }

    fn name(&self) -> &str {
        "function"
    }
}
