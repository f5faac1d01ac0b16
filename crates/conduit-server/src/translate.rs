//! Translation between HTTP messages and Conduit requests and responses.
//!
//! Shared by the HTTP adapter and the function adapter's HTTP mode.

use bytes::Bytes;
use conduit_core::{ErrorCode, HandlerResult, Request, Response};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use uuid::Uuid;

/// Type alias for HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = http::Response<ResponseBody>;

/// Source tag stamped on requests built from HTTP.
pub const SOURCE: &str = "http";

/// Headers consulted for a caller-supplied request id, in order.
pub const REQUEST_ID_HEADERS: [&str; 3] = ["x-request-id", "x-correlation-id", "request-id"];

/// Headers consulted for the request type, in order.
pub const REQUEST_TYPE_HEADERS: [&str; 2] = ["x-request-type", "x-event-type"];

/// Headers whose values never reach request metadata.
pub const REDACTED_HEADERS: [&str; 3] = ["authorization", "proxy-authorization", "cookie"];

/// Placeholder for redacted header values.
pub const REDACTED: &str = "[REDACTED]";

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

// Framing headers describe the HTTP message, not the request.
const FRAMING_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Builds a [`Request`] from HTTP request parts and a buffered body.
///
/// - `id`: first of [`REQUEST_ID_HEADERS`], else a new UUID v7
/// - `type`: first of [`REQUEST_TYPE_HEADERS`], else the first path segment,
///   else the method
/// - `metadata`: `method`, `path`, `host`, `query`, and every header by its
///   lowercase name, with [`REDACTED_HEADERS`] masked
pub fn request_from_parts(parts: &http::request::Parts, body: Bytes) -> Request {
    let headers = &parts.headers;
    let path = parts.uri.path();

    let id = REQUEST_ID_HEADERS
        .iter()
        .find_map(|name| header(headers, name))
        .map_or_else(|| Uuid::now_v7().to_string(), str::to_string);

    let request_type = REQUEST_TYPE_HEADERS
        .iter()
        .find_map(|name| header(headers, name))
        .map(str::to_string)
        .or_else(|| {
            path.split('/')
                .find(|segment| !segment.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| parts.method.as_str().to_string());

    let mut request = Request::new(request_type, body)
        .with_id(id)
        .with_source(SOURCE)
        .with_metadata("method", parts.method.as_str())
        .with_metadata("path", path);

    if let Some(host) = header(headers, HOST.as_str()).or_else(|| parts.uri.host()) {
        request.metadata.insert("host".to_string(), host.to_string());
    }
    if let Some(query) = parts.uri.query().filter(|q| !q.is_empty()) {
        request.metadata.insert("query".to_string(), query.to_string());
    }

    for (name, value) in headers {
        let name = name.as_str();
        if FRAMING_HEADERS.contains(&name) {
            continue;
        }
        let value = if REDACTED_HEADERS.contains(&name) {
            REDACTED.to_string()
        } else {
            match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => continue,
            }
        };
        request.metadata.insert(name.to_string(), value);
    }

    request
}

/// Maps a response to its HTTP status: 200 on success, otherwise by error
/// code.
#[must_use]
pub fn status_for(response: &Response) -> StatusCode {
    if response.is_success() {
        return StatusCode::OK;
    }
    response
        .error_code()
        .map_or(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::http_status)
}

/// Renders a response with an explicit status.
///
/// Sets `Content-Type`, `X-Request-ID`, and one `X-<key>` header per
/// metadata entry (underscores become dashes). Entries that are not valid
/// header names or values are skipped.
pub fn render(response: &Response, status: StatusCode, request_id: &str) -> HttpResponse {
    let body = serde_json::to_vec(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to serialize response");
        br#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"response serialization failed","retryable":false}}"#.to_vec()
    });

    let mut http_response = http::Response::new(Full::new(Bytes::from(body)));
    *http_response.status_mut() = status;

    let headers = http_response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    for (key, value) in response.metadata() {
        let name = format!("x-{}", key.replace('_', "-")).to_ascii_lowercase();
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        if name != X_REQUEST_ID {
            headers.insert(name, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID, value);
    }

    http_response
}

/// Renders a response using [`status_for`].
pub fn http_response(response: &Response, request_id: &str) -> HttpResponse {
    render(response, status_for(response), request_id)
}

/// Renders the outcome of `Handler::handle`.
///
/// Errors render their attached response when they carry one; bare errors
/// become a 500 `INTERNAL_ERROR`.
pub fn result_response(result: HandlerResult, request_id: &str) -> HttpResponse {
    match result {
        Ok(response) => http_response(&response, request_id),
        Err(e) => {
            tracing::error!(request_id, error = %e, "handler returned an error");
            let status = e
                .response()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, status_for);
            render(&e.into_response(), status, request_id)
        }
    }
}

/// Renders an adapter-level rejection that never reached the handler.
pub fn error_response(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    request_id: &str,
) -> HttpResponse {
    let response = Response::failure(code, message, false).with_metadata("request_id", request_id);
    render(&response, status, request_id)
}
