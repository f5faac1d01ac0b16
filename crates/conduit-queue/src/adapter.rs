//! Queue-trigger batch adapter.
//!
//! One invocation carries a batch of messages. Each message becomes a
//! [`Request`], runs through the handler under its own timeout, and is then
//! classified:
//!
//! | Handler outcome                      | Redeliver? |
//! |--------------------------------------|------------|
//! | successful response                  | no         |
//! | failed response, `retryable = false` | no         |
//! | failed response, `retryable = true`  | yes        |
//! | handler error (timeout, panic, ...)  | yes        |
//!
//! With partial batch failure reporting on, redeliverable messages are
//! listed in the [`BatchResponse`]. With it off, the first redeliverable
//! message aborts the batch with [`QueueError::MessageFailed`] and the queue
//! redelivers everything.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{HandlerError, HandlerResult, Request, RequestScope};
use conduit_middleware::Handler;
use futures_util::stream::{self, StreamExt};
use serde::de::IgnoredAny;

use crate::error::{QueueError, QueueResult};
use crate::event::{BatchItemFailure, BatchResponse, SqsEvent, SqsMessage};

/// Source tag stamped on requests built from queue messages.
pub const SOURCE: &str = "sqs";

/// Request type used when a message carries no type attribute.
pub const DEFAULT_REQUEST_TYPE: &str = "sqs.message";

/// Message attributes consulted for a request id override, in order.
pub const REQUEST_ID_ATTRIBUTES: [&str; 2] = ["request_id", "X-Request-ID"];

/// Message attributes consulted for the request type, in order.
pub const REQUEST_TYPE_ATTRIBUTES: [&str; 3] = ["type", "request_type", "RequestType"];

/// Metadata key carrying the invocation's X-Ray trace header.
pub const TRACE_HEADER_KEY: &str = "x-amzn-trace-id";

/// Queue adapter settings.
#[derive(Debug, Clone)]
pub struct QueueAdapterConfig {
    /// Report per-message failures instead of failing the whole batch.
    pub partial_batch_failure: bool,

    /// Upper bound on one message's processing time.
    pub message_timeout: Option<Duration>,

    /// Messages processed at once within a batch. Values below 2 mean
    /// sequential processing.
    pub concurrency: usize,
}

impl Default for QueueAdapterConfig {
    fn default() -> Self {
        Self {
            partial_batch_failure: true,
            message_timeout: Some(Duration::from_secs(30)),
            concurrency: 1,
        }
    }
}

/// How one message ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The handler returned a successful response.
    Succeeded,

    /// The handler returned a failed response.
    Failed {
        /// Error code of the response.
        code: String,
        /// Whether the response asked for a retry.
        retryable: bool,
    },

    /// The handler returned an error instead of a response.
    Errored(String),
}

impl MessageOutcome {
    /// Returns `true` if the message should be handed back to the queue.
    pub fn needs_redelivery(&self) -> bool {
        match self {
            Self::Succeeded => false,
            Self::Failed { retryable, .. } => *retryable,
            Self::Errored(_) => true,
        }
    }

    fn from_result(result: &HandlerResult) -> Self {
        match result {
            Ok(response) if response.is_success() => Self::Succeeded,
            Ok(response) => Self::Failed {
                code: response
                    .error_code()
                    .map_or("INTERNAL_ERROR", |code| code.as_str())
                    .to_string(),
                retryable: response.is_retryable(),
            },
            Err(e) => Self::Errored(e.to_string()),
        }
    }

    fn reason(&self) -> String {
        match self {
            Self::Succeeded => "succeeded".to_string(),
            Self::Failed { code, .. } => format!("response failed with {code}"),
            Self::Errored(message) => message.clone(),
        }
    }
}

/// Builds a [`Request`] from a queue message.
///
/// - `id`: first of [`REQUEST_ID_ATTRIBUTES`], else the message id
/// - `type`: first of [`REQUEST_TYPE_ATTRIBUTES`], else
///   [`DEFAULT_REQUEST_TYPE`]
/// - `payload`: the body when it is JSON, otherwise the body as a JSON string
/// - `metadata`: message id, source queue, region, system attributes and
///   string message attributes
pub fn request_from_message(message: &SqsMessage) -> Request {
    let id = REQUEST_ID_ATTRIBUTES
        .iter()
        .find_map(|name| message.attribute(name))
        .filter(|id| !id.is_empty())
        .unwrap_or(&message.message_id)
        .to_string();

    let request_type = REQUEST_TYPE_ATTRIBUTES
        .iter()
        .find_map(|name| message.attribute(name))
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_REQUEST_TYPE);

    let payload = if serde_json::from_str::<IgnoredAny>(&message.body).is_ok() {
        message.body.clone()
    } else {
        serde_json::Value::String(message.body.clone()).to_string()
    };

    let mut request = Request::new(request_type, payload)
        .with_id(id)
        .with_source(SOURCE)
        .with_metadata("message_id", &message.message_id);

    if let Some(arn) = &message.event_source_arn {
        request.metadata.insert("event_source_arn".to_string(), arn.clone());
    }
    if let Some(region) = &message.aws_region {
        request.metadata.insert("aws_region".to_string(), region.clone());
    }
    for (name, value) in &message.attributes {
        request.metadata.insert(name.clone(), value.clone());
    }
    for (name, attr) in &message.message_attributes {
        if let Some(value) = &attr.string_value {
            request.metadata.insert(name.clone(), value.clone());
        }
    }

    request
}

/// The queue-trigger batch adapter.
#[derive(Debug, Clone)]
pub struct QueueAdapter {
    handler: Arc<Handler>,
    config: QueueAdapterConfig,
}

impl QueueAdapter {
    /// Creates an adapter around `handler`.
    pub fn new(handler: Arc<Handler>, config: QueueAdapterConfig) -> Self {
        Self { handler, config }
    }

    /// Returns the adapter settings.
    pub fn config(&self) -> &QueueAdapterConfig {
        &self.config
    }

    /// Processes one batch.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::MessageFailed`] when partial batch failure
    /// reporting is off and a message needs redelivery.
    pub async fn process_batch(
        &self,
        scope: &RequestScope,
        event: &SqsEvent,
    ) -> QueueResult<BatchResponse> {
        self.process_traced(scope, event, None).await
    }

    /// Processes one batch, attaching `trace_header` to every request that
    /// does not already carry one.
    pub(crate) async fn process_traced(
        &self,
        scope: &RequestScope,
        event: &SqsEvent,
        trace_header: Option<&str>,
    ) -> QueueResult<BatchResponse> {
        let total = event.records.len();
        tracing::debug!(messages = total, "processing batch");

        if !self.config.partial_batch_failure {
            for message in &event.records {
                let outcome = self.process_message(scope, message, trace_header).await;
                if outcome.needs_redelivery() {
                    tracing::warn!(
                        message_id = %message.message_id,
                        reason = %outcome.reason(),
                        "message failed, aborting batch"
                    );
                    return Err(QueueError::message_failed(
                        &message.message_id,
                        outcome.reason(),
                    ));
                }
            }
            tracing::info!(messages = total, "batch processed");
            return Ok(BatchResponse::default());
        }

        let mut outcomes: Vec<(usize, MessageOutcome)> = stream::iter(0..event.records.len())
            .map(|index| {
                let message = &event.records[index];
                async move { (index, self.process_message(scope, message, trace_header).await) }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let batch_item_failures: Vec<BatchItemFailure> = outcomes
            .into_iter()
            .filter(|(_, outcome)| outcome.needs_redelivery())
            .map(|(index, _)| BatchItemFailure {
                item_identifier: event.records[index].message_id.clone(),
            })
            .collect();

        tracing::info!(
            messages = total,
            failures = batch_item_failures.len(),
            "batch processed"
        );
        Ok(BatchResponse {
            batch_item_failures,
        })
    }

    /// Processes one message and classifies the outcome.
    pub async fn process_message(
        &self,
        scope: &RequestScope,
        message: &SqsMessage,
        trace_header: Option<&str>,
    ) -> MessageOutcome {
        let mut request = request_from_message(message);
        if let Some(header) = trace_header {
            request
                .metadata
                .entry(TRACE_HEADER_KEY.to_string())
                .or_insert_with(|| header.to_string());
        }

        let result = match self.config.message_timeout {
            Some(timeout) => {
                let scope = scope.with_timeout(timeout);
                tokio::time::timeout(timeout, self.handler.handle(&scope, request))
                    .await
                    .unwrap_or_else(|_| {
                        Err(HandlerError::deadline_exceeded(format!(
                            "message exceeded {}ms",
                            timeout.as_millis()
                        )))
                    })
            }
            None => self.handler.handle(scope, request).await,
        };

        let outcome = MessageOutcome::from_result(&result);
        if outcome.needs_redelivery() {
            tracing::warn!(
                message_id = %message.message_id,
                reason = %outcome.reason(),
                "message will be redelivered"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::fixtures::{EchoUseCase, ErroringUseCase, SleepingUseCase};
    use conduit_core::{ErrorCode, FnUseCase, Response, UseCase};

    fn adapter(use_case: Arc<dyn UseCase>, config: QueueAdapterConfig) -> QueueAdapter {
        let handler = Handler::builder(use_case).platform("sqs").build();
        QueueAdapter::new(Arc::new(handler), config)
    }

    /// Fails every message whose payload names a code.
    fn by_payload() -> Arc<dyn UseCase> {
        Arc::new(FnUseCase::new(|_scope, request: Request| async move {
            let value: serde_json::Value =
                serde_json::from_slice(&request.payload).unwrap_or_default();
            match value.get("fail").and_then(|v| v.as_str()) {
                Some("retry") => Ok(Response::failure(ErrorCode::Temporary, "try later", true)),
                Some("drop") => Ok(Response::failure(ErrorCode::Validation, "bad", false)),
                _ => Ok(Response::success(request.payload)),
            }
        }))
    }

    #[test]
    fn test_request_from_message() {
        let mut message = SqsMessage::new("m-1", r#"{"order":7}"#)
            .with_attribute("type", "order.created")
            .with_attribute("tenant", "acme");
        message
            .attributes
            .insert("ApproximateReceiveCount".to_string(), "2".to_string());
        message.aws_region = Some("eu-west-1".to_string());

        let request = request_from_message(&message);
        assert_eq!(request.id, "m-1");
        assert_eq!(request.request_type, "order.created");
        assert_eq!(request.source, "sqs");
        assert_eq!(&request.payload[..], br#"{"order":7}"#);
        assert_eq!(request.metadata("message_id"), Some("m-1"));
        assert_eq!(request.metadata("tenant"), Some("acme"));
        assert_eq!(request.metadata("ApproximateReceiveCount"), Some("2"));
        assert_eq!(request.metadata("aws_region"), Some("eu-west-1"));
    }

    #[test]
    fn test_request_id_override_and_text_body() {
        let message = SqsMessage::new("m-1", "plain text").with_attribute("request_id", "req-9");
        let request = request_from_message(&message);

        assert_eq!(request.id, "req-9");
        assert_eq!(request.request_type, DEFAULT_REQUEST_TYPE);
        assert_eq!(&request.payload[..], br#""plain text""#);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_only_retryable() {
        let adapter = adapter(by_payload(), QueueAdapterConfig::default());
        let event = SqsEvent::new([
            SqsMessage::new("m-1", r#"{"ok":true}"#),
            SqsMessage::new("m-2", r#"{"fail":"retry"}"#),
            SqsMessage::new("m-3", r#"{"fail":"drop"}"#),
        ]);

        let response = adapter
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap();
        assert_eq!(response.failed_ids(), vec!["m-2"]);
    }

    #[tokio::test]
    async fn test_handler_errors_are_redelivered() {
        let adapter = adapter(Arc::new(ErroringUseCase::new()), QueueAdapterConfig::default());
        let event = SqsEvent::new([SqsMessage::new("m-1", "{}"), SqsMessage::new("m-2", "{}")]);

        let response = adapter
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap();
        assert_eq!(response.failed_ids(), vec!["m-1", "m-2"]);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_batch() {
        let echo = Arc::new(EchoUseCase::new());
        let config = QueueAdapterConfig {
            partial_batch_failure: false,
            ..QueueAdapterConfig::default()
        };
        let failing = adapter(by_payload(), config.clone());
        let event = SqsEvent::new([
            SqsMessage::new("m-1", r#"{"fail":"retry"}"#),
            SqsMessage::new("m-2", "{}"),
        ]);

        let err = failing
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::MessageFailed { ref message_id, .. } if message_id == "m-1"));

        let passing = adapter(echo.clone(), config);
        let response = passing
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap();
        assert!(response.is_empty());
        assert_eq!(echo.calls(), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_ignores_non_retryable() {
        let config = QueueAdapterConfig {
            partial_batch_failure: false,
            ..QueueAdapterConfig::default()
        };
        let adapter = adapter(by_payload(), config);
        let event = SqsEvent::new([SqsMessage::new("m-1", r#"{"fail":"drop"}"#)]);

        assert!(adapter
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_timeout() {
        let config = QueueAdapterConfig {
            message_timeout: Some(Duration::from_millis(50)),
            ..QueueAdapterConfig::default()
        };
        let adapter = adapter(Arc::new(SleepingUseCase::new(Duration::from_secs(5))), config);
        let event = SqsEvent::new([SqsMessage::new("slow", "{}")]);

        let response = adapter
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap();
        assert_eq!(response.failed_ids(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_concurrent_batch_keeps_order() {
        let config = QueueAdapterConfig {
            concurrency: 4,
            ..QueueAdapterConfig::default()
        };
        let adapter = adapter(by_payload(), config);
        let event = SqsEvent::new((0..8).map(|i| {
            let body = if i % 2 == 0 { r#"{"fail":"retry"}"# } else { "{}" };
            SqsMessage::new(format!("m-{i}"), body)
        }));

        let response = adapter
            .process_batch(&RequestScope::new(), &event)
            .await
            .unwrap();
        assert_eq!(response.failed_ids(), vec!["m-0", "m-2", "m-4", "m-6"]);
    }

    #[tokio::test]
    async fn test_trace_header_attached() {
        let echo = Arc::new(EchoUseCase::new());
        let adapter = adapter(echo.clone(), QueueAdapterConfig::default());
        let event = SqsEvent::new([SqsMessage::new("m-1", "{}")]);

        adapter
            .process_traced(&RequestScope::new(), &event, Some("Root=1-abc-def"))
            .await
            .unwrap();

        let seen = echo.seen();
        assert_eq!(seen[0].metadata(TRACE_HEADER_KEY), Some("Root=1-abc-def"));
    }
}
