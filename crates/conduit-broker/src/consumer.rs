//! Broker-consumer adapter.
//!
//! Consumes one delivery at a time and settles it from the handler's
//! outcome:
//!
//! | Outcome                                     | Settlement                    |
//! |---------------------------------------------|-------------------------------|
//! | successful response                         | ack                           |
//! | failure, first delivery                     | nack, `requeue = true`        |
//! | failure, already redelivered                | nack, `requeue = false`       |
//! | failure caused by shutdown cancellation     | nack, `requeue = true`        |
//!
//! On shutdown the consumer is cancelled, deliveries already buffered on the
//! channel are nacked with `requeue = true`, and the channel is closed.

use std::sync::Arc;
use std::time::Duration;

use conduit_core::{ErrorCode, HandlerError, HandlerResult, Request, RequestScope};
use conduit_middleware::Handler;
use serde::de::IgnoredAny;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{BrokerChannel, Delivery};
use crate::error::BrokerResult;

/// Source tag stamped on requests built from broker deliveries.
pub const SOURCE: &str = "rabbitmq";

/// Request type used when a delivery names none.
pub const DEFAULT_REQUEST_TYPE: &str = "amqp.message";

/// Headers consulted for the request type, in order.
pub const REQUEST_TYPE_HEADERS: [&str; 3] = ["type", "x-request-type", "request_type"];

/// Consumer settings.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Queue to declare and consume.
    pub queue: String,

    /// Bound on unacknowledged deliveries.
    pub prefetch: u16,

    /// Upper bound on one message's processing time.
    pub message_timeout: Option<Duration>,

    /// Consumer tag registered with the broker.
    pub consumer_tag: String,
}

impl ConsumerConfig {
    /// Creates settings for `queue` with a generated consumer tag.
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            prefetch: 10,
            message_timeout: Some(Duration::from_secs(30)),
            consumer_tag: format!("conduit-{}", Uuid::now_v7().simple()),
        }
    }
}

/// Builds a [`Request`] from a delivery.
///
/// - `id`: the `message-id` property, else `<consumer_tag>-<delivery_tag>`
/// - `type`: first of [`REQUEST_TYPE_HEADERS`], else the `type` property,
///   else the routing key, else [`DEFAULT_REQUEST_TYPE`]
/// - `payload`: the body when it is JSON, otherwise the body as a JSON string
pub fn request_from_delivery(delivery: &Delivery, consumer_tag: &str) -> Request {
    let id = delivery
        .message_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{consumer_tag}-{}", delivery.delivery_tag));

    let request_type = REQUEST_TYPE_HEADERS
        .iter()
        .find_map(|name| delivery.headers.get(*name))
        .or(delivery.kind.as_ref())
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .or_else(|| Some(delivery.routing_key.as_str()).filter(|k| !k.is_empty()))
        .unwrap_or(DEFAULT_REQUEST_TYPE);

    let payload = if serde_json::from_slice::<IgnoredAny>(&delivery.body).is_ok() {
        delivery.body.clone()
    } else {
        let text = String::from_utf8_lossy(&delivery.body).into_owned();
        serde_json::Value::String(text).to_string().into()
    };

    let mut request = Request::new(request_type, payload)
        .with_id(id)
        .with_source(SOURCE)
        .with_metadata("delivery_tag", delivery.delivery_tag.to_string())
        .with_metadata("redelivered", delivery.redelivered.to_string())
        .with_metadata("routing_key", &delivery.routing_key)
        .with_metadata("exchange", &delivery.exchange);

    if let Some(correlation_id) = &delivery.correlation_id {
        request
            .metadata
            .insert("correlation_id".to_string(), correlation_id.clone());
    }
    if let Some(content_type) = &delivery.content_type {
        request
            .metadata
            .insert("content_type".to_string(), content_type.clone());
    }
    for (name, value) in &delivery.headers {
        request.metadata.insert(name.clone(), value.clone());
    }

    request
}

/// The broker-consumer adapter.
pub struct BrokerConsumer {
    handler: Arc<Handler>,
    channel: Arc<dyn BrokerChannel>,
    config: ConsumerConfig,
}

impl std::fmt::Debug for BrokerConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConsumer")
            .field("handler", &self.handler)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BrokerConsumer {
    /// Creates a consumer that reads from `channel`.
    pub fn new(handler: Arc<Handler>, channel: Arc<dyn BrokerChannel>, config: ConsumerConfig) -> Self {
        Self {
            handler,
            channel,
            config,
        }
    }

    /// Returns the consumer settings.
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Declares the queue, applies the prefetch bound, and consumes until
    /// `shutdown` is cancelled or the broker ends the consumer.
    ///
    /// # Errors
    ///
    /// Returns channel errors from setup, receive, or settlement.
    pub async fn run(&self, shutdown: CancellationToken) -> BrokerResult<()> {
        let queue = self.config.queue.as_str();
        let tag = self.config.consumer_tag.as_str();

        self.channel.declare_queue(queue).await?;
        self.channel.set_prefetch(self.config.prefetch).await?;
        self.channel.consume(queue, tag).await?;
        tracing::info!(
            queue,
            consumer_tag = tag,
            prefetch = self.config.prefetch,
            "broker consumer started"
        );

        let result = self.consume_loop(&shutdown).await;
        let stopped = self.stop().await;
        result.and(stopped)
    }

    async fn consume_loop(&self, shutdown: &CancellationToken) -> BrokerResult<()> {
        loop {
            let delivery = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::info!("shutdown requested, stopping consumer");
                    return Ok(());
                }
                next = self.channel.recv() => match next? {
                    Some(delivery) => delivery,
                    None => {
                        tracing::info!("consumer stream ended");
                        return Ok(());
                    }
                },
            };
            self.process(shutdown, delivery).await?;
        }
    }

    async fn stop(&self) -> BrokerResult<()> {
        let tag = self.config.consumer_tag.as_str();
        self.channel.cancel(tag).await?;

        let buffered = self.channel.drain_buffered().await?;
        if !buffered.is_empty() {
            tracing::info!(count = buffered.len(), "requeueing buffered deliveries");
        }
        for delivery in buffered {
            self.channel.nack(delivery.delivery_tag, true).await?;
        }

        self.channel.close().await?;
        tracing::info!(consumer_tag = tag, "broker consumer stopped");
        Ok(())
    }

    /// Processes and settles one delivery.
    pub async fn process(&self, shutdown: &CancellationToken, delivery: Delivery) -> BrokerResult<()> {
        let request = request_from_delivery(&delivery, &self.config.consumer_tag);
        let request_id = request.id.clone();
        let scope = RequestScope::with_token(shutdown.child_token());

        let result: HandlerResult = match self.config.message_timeout {
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
            None => self.handler.handle(&scope, request).await,
        };

        let tag = delivery.delivery_tag;
        match result {
            Ok(response) if response.is_success() => {
                tracing::debug!(request_id, delivery_tag = tag, "ack");
                self.channel.ack(tag).await
            }
            outcome => {
                let cancelled_by_shutdown = shutdown.is_cancelled()
                    && match &outcome {
                        Err(e) => e.is_cancellation(),
                        Ok(response) => response.error_code() == Some(&ErrorCode::Cancelled),
                    };
                let requeue = cancelled_by_shutdown || !delivery.redelivered;

                let reason = match &outcome {
                    Ok(response) => response
                        .error()
                        .map_or_else(|| "failed".to_string(), |e| e.code.as_str().to_string()),
                    Err(e) => e.to_string(),
                };
                tracing::warn!(
                    request_id,
                    delivery_tag = tag,
                    redelivered = delivery.redelivered,
                    requeue,
                    reason,
                    "nack"
                );
                self.channel.nack(tag, requeue).await
            }
        }
    }
}
