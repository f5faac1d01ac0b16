//! Broker adapter errors.

use thiserror::Error;

/// Result alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors raised by broker channels and the consumer loop.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The AMQP client reported an error.
    #[cfg(feature = "amqp")]
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The channel was used before `consume` was called.
    #[error("no active consumer on channel")]
    NotConsuming,

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,

    /// A delivery tag was settled twice or never issued.
    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),
}
