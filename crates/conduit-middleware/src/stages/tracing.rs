//! Trace propagation.
//!
//! Every request gets a trace id and a fresh span id. The trace id is taken
//! from the first of [`TRACE_ID_KEYS`] present in the request metadata
//! (matched case-insensitively, with vendor formats unpacked) or generated
//! when none is found. Both ids are written to the scope, to the request
//! metadata for the use case, and to the response metadata for the caller.
//!
//! With span export enabled an OpenTelemetry span is opened per request,
//! parented on an inbound W3C `traceparent`, and its ids take precedence over
//! generated ones.

use crate::middleware::{BoxFuture, Middleware, Next};
use conduit_core::{HandlerResult, Request, RequestScope};
use conduit_telemetry::fields;
use opentelemetry::trace::{Span as _, SpanContext, Status, Tracer as _};
use opentelemetry::KeyValue;
use std::collections::HashMap;
use tracing::Instrument;
use uuid::Uuid;

/// The W3C Trace Context header.
pub const TRACEPARENT: &str = "traceparent";

/// Metadata keys consulted for an inbound trace id, in priority order.
pub const TRACE_ID_KEYS: [&str; 8] = [
    "trace_id",
    "x-trace-id",
    TRACEPARENT,
    "x-amzn-trace-id",
    "awstraceheader",
    "x-b3-traceid",
    "x-cloud-trace-context",
    "uber-trace-id",
];

/// Middleware that propagates or creates trace identifiers.
#[derive(Debug, Clone, Default)]
pub struct TracingMiddleware {
    export_spans: bool,
}

impl TracingMiddleware {
    /// Creates a tracing stage that only propagates identifiers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            export_spans: false,
        }
    }

    /// Opens an OpenTelemetry span per request through the global tracer.
    #[must_use]
    pub const fn export_spans(mut self, enabled: bool) -> Self {
        self.export_spans = enabled;
        self
    }

    fn start_span(request: &Request) -> opentelemetry::global::BoxedSpan {
        let parent = conduit_telemetry::tracing::extract_context(&request.metadata);
        let mut span = conduit_telemetry::tracing::tracer().start_with_context(
            format!("{} {}", request.source, request.request_type),
            &parent,
        );
        span.set_attribute(KeyValue::new("conduit.request.id", request.id.clone()));
        span.set_attribute(KeyValue::new(
            "conduit.request.type",
            request.request_type.clone(),
        ));
        span.set_attribute(KeyValue::new("conduit.source", request.source.clone()));
        span
    }
}

fn lookup<'m>(metadata: &'m HashMap<String, String>, key: &str) -> Option<&'m str> {
    metadata
        .get(key)
        .or_else(|| {
            metadata
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Finds an inbound trace id in request metadata.
pub fn extract_trace_id(metadata: &HashMap<String, String>) -> Option<String> {
    TRACE_ID_KEYS.iter().find_map(|&key| {
        let value = lookup(metadata, key)?;
        match key {
            TRACEPARENT => TraceContext::parse(value).map(|ctx| ctx.trace_id),
            // Root=1-5759e988-bd862e3fe1be46a994272793;Parent=...;Sampled=1
            "x-amzn-trace-id" | "awstraceheader" => value
                .split(';')
                .find_map(|part| part.trim().strip_prefix("Root="))
                .and_then(non_empty),
            // TRACE_ID/SPAN_ID;o=1
            "x-cloud-trace-context" => value.split('/').next().and_then(non_empty),
            // trace-id:span-id:parent-id:flags
            "uber-trace-id" => value.split(':').next().and_then(non_empty),
            _ => non_empty(value),
        }
    })
}

/// Generates a 128-bit trace id as 32 hex characters.
pub fn generate_trace_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Generates a 64-bit span id as 16 hex characters.
pub fn generate_span_id() -> String {
    // The tail of a v7 UUID is random; the head is a timestamp.
    Uuid::now_v7().simple().to_string()[16..].to_string()
}

impl Middleware for TracingMiddleware {
    fn name(&self) -> &'static str {
        "tracing"
    }

    fn process<'a>(
        &'a self,
        scope: &'a RequestScope,
        mut request: Request,
        next: &'a Next,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let inbound = extract_trace_id(&request.metadata);
            let mut otel_span = self.export_spans.then(|| Self::start_span(&request));
            let otel_context = otel_span
                .as_ref()
                .map(|span| span.span_context().clone())
                .filter(SpanContext::is_valid);

            let (trace_id, span_id) = match otel_context {
                Some(ctx) => (
                    inbound.unwrap_or_else(|| ctx.trace_id().to_string()),
                    ctx.span_id().to_string(),
                ),
                None => (inbound.unwrap_or_else(generate_trace_id), generate_span_id()),
            };

            if let Some(parent) = lookup(&request.metadata, TRACEPARENT)
                .and_then(TraceContext::parse)
                .map(|ctx| ctx.parent_span_id)
            {
                request
                    .metadata
                    .insert("parent_span_id".to_string(), parent);
            }
            request
                .metadata
                .insert(fields::TRACE_ID.to_string(), trace_id.clone());
            request
                .metadata
                .insert(fields::SPAN_ID.to_string(), span_id.clone());

            let mut scope = scope.clone();
            scope.set_trace_id(trace_id.clone());
            scope.set_span_id(span_id.clone());

            let span = tracing::info_span!(
                "request",
                request_id = %request.id,
                trace_id = %trace_id,
                span_id = %span_id,
                request_type = %request.request_type,
                source = %request.source,
            );

            let mut result = next.run(&scope, request).instrument(span).await;

            let response = match &mut result {
                Ok(response) => Some(response),
                Err(e) => e.response_mut(),
            };
            if let Some(response) = response {
                let metadata = response.metadata_mut();
                metadata.insert(fields::TRACE_ID.to_string(), trace_id);
                metadata.insert(fields::SPAN_ID.to_string(), span_id);
            }

            if let Some(span) = otel_span.as_mut() {
                match &result {
                    Ok(response) if response.is_success() => span.set_status(Status::Ok),
                    Ok(response) => span.set_status(Status::error(
                        response
                            .error_code()
                            .map(ToString::to_string)
                            .unwrap_or_default(),
                    )),
                    Err(e) => span.set_status(Status::error(e.to_string())),
                }
                span.end();
            }

            result
        })
    }
}

/// A parsed W3C `traceparent` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// The 128-bit trace id as 32 hex characters.
    pub trace_id: String,
    /// The caller's span id as 16 hex characters.
    pub parent_span_id: String,
    /// Whether the caller sampled the trace.
    pub sampled: bool,
}

impl TraceContext {
    /// Parses `{version}-{trace-id}-{parent-span-id}-{flags}`.
    ///
    /// Returns `None` for unsupported versions, malformed fields, or the
    /// all-zero ids the format reserves as invalid.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let (version, trace_id, parent_span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }

        let is_hex = |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex(trace_id, 32) || !is_hex(parent_span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.chars().all(|c| c == '0') || parent_span_id.chars().all(|c| c == '0') {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id: parent_span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::fixtures::{EchoUseCase, FailingUseCase};
    use conduit_core::ErrorCode;
    use std::sync::Arc;

    const PARENT: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_parse_traceparent() {
        let ctx = TraceContext::parse(PARENT).unwrap();
        assert_eq!(ctx.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(ctx.parent_span_id, "b7ad6b7169203331");
        assert!(ctx.sampled);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(TraceContext::parse("").is_none());
        assert!(TraceContext::parse("01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").is_none());
        assert!(TraceContext::parse("00-xyz-b7ad6b7169203331-01").is_none());
        assert!(TraceContext::parse("00-00000000000000000000000000000000-b7ad6b7169203331-01").is_none());
        assert!(TraceContext::parse(&format!("{PARENT}-extra")).is_none());
    }

    #[test]
    fn test_key_priority() {
        let md = metadata(&[("X-Trace-Id", "from-header"), ("traceparent", PARENT)]);
        assert_eq!(extract_trace_id(&md).as_deref(), Some("from-header"));

        let md = metadata(&[("traceparent", PARENT), ("x-b3-traceid", "b3")]);
        assert_eq!(
            extract_trace_id(&md).as_deref(),
            Some("0af7651916cd43dd8448eb211c80319c")
        );
    }

    #[test]
    fn test_vendor_formats() {
        let md = metadata(&[(
            "AWSTraceHeader",
            "Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1",
        )]);
        assert_eq!(
            extract_trace_id(&md).as_deref(),
            Some("1-5759e988-bd862e3fe1be46a994272793")
        );

        let md = metadata(&[("x-cloud-trace-context", "105445aa7843bc8bf206b12000100000/1;o=1")]);
        assert_eq!(
            extract_trace_id(&md).as_deref(),
            Some("105445aa7843bc8bf206b12000100000")
        );

        let md = metadata(&[("uber-trace-id", "abc123:def456:0:1")]);
        assert_eq!(extract_trace_id(&md).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_invalid_traceparent_falls_through() {
        let md = metadata(&[("traceparent", "garbage"), ("x-b3-traceid", "b3-id")]);
        assert_eq!(extract_trace_id(&md).as_deref(), Some("b3-id"));
        assert!(extract_trace_id(&HashMap::new()).is_none());
    }

    #[test]
    fn test_generated_id_shapes() {
        assert_eq!(generate_trace_id().len(), 32);
        let a = generate_span_id();
        let b = generate_span_id();
        assert_eq!(a.len(), 16);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_propagates_inbound_trace() {
        let echo = Arc::new(EchoUseCase::new());
        let next = Next::new(
            Arc::new(TracingMiddleware::new()),
            Next::endpoint(echo.clone()),
        );

        let request = Request::new("t", "{}").with_metadata("traceparent", PARENT);
        let response = next.run(&RequestScope::new(), request).await.unwrap();

        let seen = echo.seen();
        let seen = &seen[0];
        assert_eq!(seen.metadata("trace_id"), Some("0af7651916cd43dd8448eb211c80319c"));
        assert_eq!(seen.metadata("parent_span_id"), Some("b7ad6b7169203331"));
        let span_id = seen.metadata("span_id").unwrap();
        assert_ne!(span_id, "b7ad6b7169203331");

        assert_eq!(
            response.metadata().get("trace_id").map(String::as_str),
            Some("0af7651916cd43dd8448eb211c80319c")
        );
        assert_eq!(response.metadata().get("span_id").map(String::as_str), Some(span_id));
    }

    #[tokio::test]
    async fn test_generates_trace_and_tags_failures() {
        let next = Next::new(
            Arc::new(TracingMiddleware::new().export_spans(true)),
            Next::endpoint(Arc::new(FailingUseCase::new(ErrorCode::NotFound, false))),
        );

        let response = next
            .run(&RequestScope::new(), Request::new("t", "{}"))
            .await
            .unwrap();

        assert!(!response.is_success());
        assert_eq!(response.metadata()["trace_id"].len(), 32);
        assert_eq!(response.metadata()["span_id"].len(), 16);
    }
}
