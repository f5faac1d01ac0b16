//! # Conduit Broker
//!
//! Broker-consumer adapter for the Conduit request-dispatch framework.
//!
//! [`BrokerConsumer`] declares a durable queue, bounds unacknowledged
//! deliveries with a prefetch count, and consumes with manual
//! acknowledgement. Failed messages are requeued once; a message that fails
//! again after redelivery is dropped (or dead-lettered by the broker).
//!
//! Transports implement [`BrokerChannel`]:
//!
//! - [`MemoryChannel`] - in-process queue for tests and local runs
//! - `AmqpChannel` - RabbitMQ over `lapin` (feature `amqp`, on by default)
//!
//! ## Example
//!
//! ```rust
//! use conduit_broker::{BrokerConsumer, ConsumerConfig, MemoryChannel, Settlement};
//! use conduit_core::fixtures::EchoUseCase;
//! use conduit_core::CancellationToken;
//! use conduit_middleware::Handler;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let channel = MemoryChannel::new();
//! channel.publish_body("m-1", r#"{"x":1}"#);
//! channel.end_stream();
//!
//! let handler = Handler::builder(Arc::new(EchoUseCase::new())).build();
//! let consumer = BrokerConsumer::new(
//!     Arc::new(handler),
//!     Arc::new(channel.clone()),
//!     ConsumerConfig::new("jobs"),
//! );
//! consumer.run(CancellationToken::new()).await.unwrap();
//!
//! assert_eq!(channel.settlements(), vec![Settlement::Ack(1)]);
//! # }
//! ```

#![doc(html_root_url = "https://docs.rs/conduit-broker/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

#[cfg(feature = "amqp")]
mod amqp;
mod channel;
mod consumer;
mod error;
mod memory;

#[cfg(feature = "amqp")]
pub use amqp::AmqpChannel;
pub use channel::{BrokerChannel, Delivery};
pub use consumer::{
    request_from_delivery, BrokerConsumer, ConsumerConfig, DEFAULT_REQUEST_TYPE,
    REQUEST_TYPE_HEADERS, SOURCE,
};
pub use error::{BrokerError, BrokerResult};
pub use memory::{MemoryChannel, Settlement};
