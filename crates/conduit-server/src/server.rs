//! HTTP adapter.
//!
//! Accepts HTTP/1.1 connections with Hyper and Tokio and feeds every
//! business request through a shared [`Handler`].
//!
//! | Request                        | Outcome                                   |
//! |--------------------------------|-------------------------------------------|
//! | any method on a health path    | use-case health probe, 200 or 503         |
//! | `POST` elsewhere               | body read, [`Handler::handle`], mapped    |
//! | other methods                  | 405 with `Allow: POST`                    |
//! | body larger than the limit     | 400 `INVALID_REQUEST`                     |
//!
//! Shutdown stops the accept loop, asks open connections to finish their
//! current request, and waits at most the configured shutdown timeout.
//!
//! # Example
//!
//! ```rust,no_run
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_middleware::Handler;
//! use conduit_server::{Server, ServerConfig, ShutdownSignal};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), conduit_server::ServerError> {
//! let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
//! let config = ServerConfig::builder().addr("0.0.0.0:8080").build();
//!
//! let shutdown = ShutdownSignal::with_os_signals()?;
//! Server::new(Arc::new(handler), config).run(shutdown).await
//! # }
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use conduit_core::{ErrorCode, RequestScope};
use conduit_middleware::Handler;
use http::header::{HeaderValue, ALLOW, CONTENT_LENGTH};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, is_health_path};
use crate::shutdown::ShutdownSignal;
use crate::translate::{self, HttpResponse};

/// The HTTP adapter.
#[derive(Debug, Clone)]
pub struct Server {
    handler: Arc<Handler>,
    config: ServerConfig,
}

impl Server {
    /// Creates a server around `handler`.
    #[must_use]
    pub fn new(handler: Arc<Handler>, config: ServerConfig) -> Self {
        Self { handler, config }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the wired handler.
    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Binds the configured address and serves until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr: SocketAddr =
            self.config
                .socket_addr()
                .map_err(|e| ServerError::InvalidAddress {
                    addr: self.config.addr().to_string(),
                    reason: e.to_string(),
                })?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// fires, then drains in-flight connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let config = self.config.clone();
        serve_with(Arc::new(self), listener, &config, shutdown).await
    }

    /// Handles one HTTP request.
    ///
    /// Never fails: every outcome, including a body that cannot be read, is
    /// rendered as a JSON response.
    pub async fn handle<B>(&self, request: http::Request<B>) -> HttpResponse
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if is_health_path(request.uri().path()) {
            return health::respond(&self.handler).await;
        }

        let (parts, body) = request.into_parts();

        if parts.method != Method::POST {
            let request_id = translate::request_from_parts(&parts, Bytes::new()).id;
            let mut response = translate::error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                ErrorCode::InvalidRequest,
                format!("method {} not allowed", parts.method),
                &request_id,
            );
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("POST"));
            return response;
        }

        let limit = self.config.max_request_size();
        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > limit as u64) {
            return self.too_large(&parts, limit);
        }

        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => return self.too_large(&parts, limit),
            Err(e) => {
                let request_id = translate::request_from_parts(&parts, Bytes::new()).id;
                tracing::warn!(request_id, error = %e, "failed to read request body");
                return translate::error_response(
                    StatusCode::BAD_REQUEST,
                    ErrorCode::InvalidRequest,
                    format!("failed to read request body: {e}"),
                    &request_id,
                );
            }
        };

        let request = translate::request_from_parts(&parts, body);
        let request_id = request.id.clone();
        tracing::debug!(
            request_id,
            method = %parts.method,
            path = parts.uri.path(),
            "dispatching HTTP request"
        );

        let result = self.handler.handle(&RequestScope::new(), request).await;
        translate::result_response(result, &request_id)
    }

    fn too_large(&self, parts: &http::request::Parts, limit: usize) -> HttpResponse {
        let request_id = translate::request_from_parts(parts, Bytes::new()).id;
        tracing::warn!(request_id, limit, "request body exceeds limit");
        translate::error_response(
            StatusCode::BAD_REQUEST,
            ErrorCode::InvalidRequest,
            format!("request body exceeds {limit} bytes"),
            &request_id,
        )
    }
}

impl HttpHandler for Server {
    async fn call(&self, request: http::Request<Incoming>) -> HttpResponse {
        self.handle(request).await
    }
}

/// A request handler that can sit behind [`serve_with`].
pub trait HttpHandler: Send + Sync + 'static {
    /// Handles one HTTP request. Every outcome is a response.
    fn call(
        &self,
        request: http::Request<Incoming>,
    ) -> impl std::future::Future<Output = HttpResponse> + Send;

    /// Name reported in the startup log.
    fn name(&self) -> &str {
        "http"
    }
}

/// Serves HTTP/1.1 connections from `listener` with `service` until
/// `shutdown` fires, then drains in-flight connections for at most the
/// configured shutdown timeout.
///
/// The connection limit from `config` is enforced before accepting.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve_with<H: HttpHandler>(
    service: Arc<H>,
    listener: TcpListener,
    config: &ServerConfig,
    shutdown: ShutdownSignal,
) -> Result<(), ServerError> {
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, service = service.name(), "HTTP listener started");

    let tracker = TaskTracker::new();
    let limiter = config
        .max_connections()
        .map(|max| Arc::new(Semaphore::new(max)));

    loop {
        let permit = match &limiter {
            Some(limiter) => tokio::select! {
                permit = Arc::clone(limiter).acquire_owned() => permit.ok(),
                () = shutdown.recv() => break,
            },
            None => None,
        };

        let (stream, remote_addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                    continue;
                }
            },
            () = shutdown.recv() => break,
        };

        let service = Arc::clone(&service);
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            if let Err(e) = serve_connection(service, stream, shutdown).await {
                tracing::debug!(remote = %remote_addr, error = %e, "connection error");
            }
            drop(permit);
        });
    }

    tracker.close();
    let shutdown_timeout = config.shutdown_timeout();
    tracing::info!(
        timeout_ms = shutdown_timeout.as_millis() as u64,
        connections = tracker.len(),
        "shutdown signal received, draining connections"
    );

    if tokio::time::timeout(shutdown_timeout, tracker.wait())
        .await
        .is_err()
    {
        tracing::warn!(
            connections = tracker.len(),
            "shutdown timeout reached, abandoning open connections"
        );
    }

    tracing::info!("HTTP listener stopped");
    Ok(())
}

async fn serve_connection<H: HttpHandler>(
    service: Arc<H>,
    stream: TcpStream,
    shutdown: ShutdownSignal,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);
    let hyper_service = service_fn(move |request: http::Request<Incoming>| {
        let service = Arc::clone(&service);
        async move { Ok::<_, Infallible>(service.call(request).await) }
    });

    let conn = http1::Builder::new().serve_connection(io, hyper_service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::fixtures::{EchoUseCase, FailingUseCase, UnhealthyUseCase};
    use conduit_core::UseCase;
    use conduit_middleware::stages::ValidationMiddleware;
    use http_body_util::Full;
    use std::time::Duration;

    fn server(use_case: Arc<dyn UseCase>) -> Server {
        let handler = Handler::builder(use_case)
            .middleware(ValidationMiddleware::new())
            .worker_name("http-test")
            .platform("http")
            .build();
        let config = ServerConfig::builder()
            .addr("127.0.0.1:0")
            .max_request_size(64)
            .shutdown_timeout(Duration::from_millis(200))
            .build();
        Server::new(Arc::new(handler), config)
    }

    fn request(method: Method, uri: &str, body: &'static str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    async fn json_body(response: HttpResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_echo() {
        let server = server(Arc::new(EchoUseCase::new()));
        let mut req = request(Method::POST, "/echo", r#"{"x":1}"#);
        req.headers_mut()
            .insert("x-request-id", HeaderValue::from_static("req-42"));

        let response = server.handle(req).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
        assert_eq!(response.headers()["content-type"], "application/json");

        let body = json_body(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn test_empty_body_is_validation_error() {
        let server = server(Arc::new(EchoUseCase::new()));
        let response = server.handle(request(Method::POST, "/download", "")).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_failure_status_mapping() {
        let server = server(Arc::new(FailingUseCase::new("NOT_FOUND", false)));
        let response = server.handle(request(Method::POST, "/lookup", "{}")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["retryable"], false);
    }

    #[tokio::test]
    async fn test_health_healthy_on_any_method() {
        let server = server(Arc::new(EchoUseCase::new()));

        for method in [Method::GET, Method::HEAD, Method::POST] {
            let response = server.handle(request(method, "/healthz", "")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = server.handle(request(Method::GET, "/health", "")).await;
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["worker"], "http-test");
    }

    #[tokio::test]
    async fn test_health_unhealthy() {
        let server = server(Arc::new(UnhealthyUseCase));
        let response = server.handle(request(Method::GET, "/health", "")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["status"], "unhealthy");
        assert!(body["error"].as_str().unwrap().contains("database unreachable"));
    }

    #[tokio::test]
    async fn test_non_post_is_method_not_allowed() {
        let echo = Arc::new(EchoUseCase::new());
        let server = server(echo.clone());
        let response = server.handle(request(Method::GET, "/echo", "")).await;

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "POST");
        assert_eq!(echo.calls(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let echo = Arc::new(EchoUseCase::new());
        let server = server(echo.clone());
        let big = r#"{"data":"0123456789012345678901234567890123456789012345678901234567890123456789"}"#;

        // Without Content-Length the limit applies while reading.
        let response = server.handle(request(Method::POST, "/echo", big)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_REQUEST");

        let mut req = request(Method::POST, "/echo", "{}");
        req.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from_static("1000000"));
        let response = server.handle(req).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(echo.calls(), 0);
    }

    #[tokio::test]
    async fn test_run_invalid_address() {
        let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
        let config = ServerConfig::builder().addr("not-a-valid-address").build();

        let result = Server::new(Arc::new(handler), config)
            .run(ShutdownSignal::new())
            .await;
        assert!(matches!(result, Err(ServerError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let server = server(Arc::new(EchoUseCase::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(server.serve(listener, shutdown.clone()));

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{addr}/echo"))
            .header("X-Request-Type", "echo")
            .body(r#"{"hello":"world"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().contains_key("x-request-id"));
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["data"]["hello"], "world");

        shutdown.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_max_connections_limit_still_serves() {
        let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
        let config = ServerConfig::builder()
            .max_connections(Some(1))
            .shutdown_timeout(Duration::from_millis(200))
            .build();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(Server::new(Arc::new(handler), config).serve(listener, shutdown.clone()));

        let response = reqwest::get(format!("http://{addr}/ready")).await.unwrap();
        assert_eq!(response.status(), 200);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
