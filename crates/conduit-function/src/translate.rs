//! Function input to [`Request`] translation.
//!
//! The input is first tried as a complete [`Request`] object. Anything else
//! is treated as a raw payload and described by the host environment.

use bytes::Bytes;
use conduit_core::Request;
use conduit_server::translate::{REDACTED, REDACTED_HEADERS, REQUEST_TYPE_HEADERS};
use serde::de::IgnoredAny;
use uuid::Uuid;

use crate::env::FunctionEnv;

/// Source tag stamped on function requests.
pub const SOURCE: &str = "openfaas";

/// Request type used when neither a header, the path, nor the function
/// name provides one.
pub const DEFAULT_REQUEST_TYPE: &str = "function.invoke";

/// Headers consulted for the request id, in order.
pub const REQUEST_ID_HEADERS: [&str; 2] = ["x-request-id", "x-call-id"];

/// Function identity.
///
/// Unset fields fall back to the host environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionSettings {
    /// Function name.
    pub name: Option<String>,

    /// Function namespace.
    pub namespace: Option<String>,
}

impl FunctionSettings {
    /// Creates settings for a named function.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: None,
        }
    }
}

/// Builds a [`Request`] from one invocation's input.
///
/// A JSON object with a non-empty `type` is taken as a complete request.
/// Otherwise the input is the payload (wrapped as a JSON string when it is
/// not JSON) and:
///
/// - `id`: first of [`REQUEST_ID_HEADERS`], else a new UUID v7
/// - `type`: first of the HTTP type headers, else the first path segment,
///   else the function name, else [`DEFAULT_REQUEST_TYPE`]
/// - `metadata`: `method`, `path`, `query`, and every re-exposed header,
///   with credentials masked
///
/// Either way `function_name` and `namespace` metadata are added when known.
pub fn request_from_input(input: &[u8], env: &FunctionEnv, settings: &FunctionSettings) -> Request {
    let name = settings.name.as_deref().or_else(|| env.function_name());
    let namespace = settings.namespace.as_deref().or_else(|| env.namespace());

    let mut request = parse_request(input).unwrap_or_else(|| raw_request(input, env, name));
    if request.source.is_empty() {
        request.source = SOURCE.to_string();
    }
    if let Some(name) = name {
        request
            .metadata
            .entry("function_name".to_string())
            .or_insert_with(|| name.to_string());
    }
    if let Some(namespace) = namespace {
        request
            .metadata
            .entry("namespace".to_string())
            .or_insert_with(|| namespace.to_string());
    }
    request
}

fn parse_request(input: &[u8]) -> Option<Request> {
    serde_json::from_slice::<Request>(input)
        .ok()
        .filter(|request| !request.request_type.trim().is_empty())
}

fn raw_request(input: &[u8], env: &FunctionEnv, name: Option<&str>) -> Request {
    let id = REQUEST_ID_HEADERS
        .iter()
        .find_map(|header| env.header(header))
        .map_or_else(|| Uuid::now_v7().to_string(), str::to_string);

    let request_type = REQUEST_TYPE_HEADERS
        .iter()
        .find_map(|header| env.header(header))
        .or_else(|| {
            env.path()
                .and_then(|path| path.split('/').find(|segment| !segment.is_empty()))
        })
        .or(name)
        .unwrap_or(DEFAULT_REQUEST_TYPE);

    let mut request = Request::new(request_type, payload(input))
        .with_id(id)
        .with_source(SOURCE);

    for (key, value) in [("method", env.method()), ("path", env.path()), ("query", env.query())] {
        if let Some(value) = value {
            request.metadata.insert(key.to_string(), value.to_string());
        }
    }
    for (name, value) in env.headers() {
        let value = if REDACTED_HEADERS.contains(&name.as_str()) {
            REDACTED
        } else {
            value
        };
        request.metadata.insert(name, value.to_string());
    }

    request
}

fn payload(input: &[u8]) -> Bytes {
    if input.iter().all(u8::is_ascii_whitespace) {
        return Bytes::new();
    }
    if serde_json::from_slice::<IgnoredAny>(input).is_ok() {
        return Bytes::copy_from_slice(input);
    }
    let text = String::from_utf8_lossy(input);
    serde_json::Value::String(text.into_owned()).to_string().into()
}
