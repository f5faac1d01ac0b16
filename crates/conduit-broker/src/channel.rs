//! Broker channel abstraction.
//!
//! A [`BrokerChannel`] is one consumer's view of a broker connection:
//! declare the queue, bound unacknowledged deliveries, receive, and settle.
//! Implementations serialize access to the underlying connection
//! internally, so a channel can be shared behind an `Arc`.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

use crate::error::BrokerResult;

/// One message handed to the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to settle the delivery.
    pub delivery_tag: u64,

    /// Exchange the message was published to.
    pub exchange: String,

    /// Routing key the message was published with.
    pub routing_key: String,

    /// `true` if the broker delivered this message before.
    pub redelivered: bool,

    /// `message-id` property.
    pub message_id: Option<String>,

    /// `type` property.
    pub kind: Option<String>,

    /// `correlation-id` property.
    pub correlation_id: Option<String>,

    /// `content-type` property.
    pub content_type: Option<String>,

    /// Application headers rendered as text.
    pub headers: HashMap<String, String>,

    /// Message body.
    pub body: Bytes,
}

impl Delivery {
    /// Creates a first-time delivery with a body.
    pub fn new(delivery_tag: u64, body: impl Into<Bytes>) -> Self {
        Self {
            delivery_tag,
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Operations the consumer loop needs from a broker.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Ensures `queue` exists: durable, non-exclusive, not auto-deleted.
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()>;

    /// Bounds unacknowledged deliveries to `prefetch`.
    async fn set_prefetch(&self, prefetch: u16) -> BrokerResult<()>;

    /// Starts a manual-ack consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> BrokerResult<()>;

    /// Waits for the next delivery. `None` means the consumer ended.
    async fn recv(&self) -> BrokerResult<Option<Delivery>>;

    /// Returns deliveries already buffered locally without waiting.
    async fn drain_buffered(&self) -> BrokerResult<Vec<Delivery>>;

    /// Acknowledges a delivery.
    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()>;

    /// Rejects a delivery, optionally returning it to the queue.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> BrokerResult<()>;

    /// Stops the consumer so no further deliveries arrive.
    async fn cancel(&self, consumer_tag: &str) -> BrokerResult<()>;

    /// Closes the channel and its connection.
    async fn close(&self) -> BrokerResult<()>;
}
