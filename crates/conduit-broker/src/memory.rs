//! In-process broker channel.
//!
//! Behaves like a single AMQP queue with one consumer. While a consumer is
//! active the "broker" pushes ready messages into a local buffer, up to the
//! prefetch bound, assigning channel-scoped delivery tags. A requeued
//! message goes back to the head of the queue flagged as redelivered, and
//! closing the channel requeues everything unacknowledged. Every ack and
//! nack is recorded for inspection.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::channel::{BrokerChannel, Delivery};
use crate::error::{BrokerError, BrokerResult};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Acknowledged.
    Ack(u64),
    /// Negatively acknowledged.
    Nack {
        /// The settled delivery.
        delivery_tag: u64,
        /// Whether it went back to the queue.
        requeue: bool,
    },
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<Delivery>,
    buffered: VecDeque<Delivery>,
    unacked: HashMap<u64, Delivery>,
    next_tag: u64,
    prefetch: u16,
    declared: Vec<String>,
    consumer_tag: Option<String>,
    cancelled: bool,
    ended: bool,
    closed: bool,
    settlements: Vec<Settlement>,
}

impl Inner {
    fn has_room(&self) -> bool {
        self.prefetch == 0 || self.unacked.len() < usize::from(self.prefetch)
    }

    /// Pushes ready messages to the active consumer's buffer.
    fn fill(&mut self) {
        if self.consumer_tag.is_none() || self.closed {
            return;
        }
        while self.has_room() {
            let Some(mut delivery) = self.ready.pop_front() else {
                break;
            };
            self.next_tag += 1;
            delivery.delivery_tag = self.next_tag;
            self.unacked.insert(delivery.delivery_tag, delivery.clone());
            self.buffered.push_back(delivery);
        }
    }

    fn requeue(&mut self, mut delivery: Delivery) {
        delivery.redelivered = true;
        delivery.delivery_tag = 0;
        self.ready.push_front(delivery);
    }
}

/// An in-memory [`BrokerChannel`].
///
/// Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl MemoryChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.lock();
        let out = f(&mut inner);
        inner.fill();
        drop(inner);
        self.notify.notify_one();
        out
    }

    /// Enqueues a message. Its delivery tag is assigned on delivery.
    pub fn publish(&self, delivery: Delivery) {
        self.update(|inner| inner.ready.push_back(delivery));
    }

    /// Enqueues a message body with a message id.
    pub fn publish_body(&self, message_id: impl Into<String>, body: impl Into<Bytes>) {
        self.publish(Delivery {
            message_id: Some(message_id.into()),
            body: body.into(),
            ..Delivery::default()
        });
    }

    /// Ends the consumer stream once nothing is left to deliver.
    pub fn end_stream(&self) {
        self.update(|inner| inner.ended = true);
    }

    /// Returns every settlement so far, in order.
    pub fn settlements(&self) -> Vec<Settlement> {
        self.inner.lock().settlements.clone()
    }

    /// Returns the number of messages waiting in the queue.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Returns the number of unacknowledged deliveries, buffered or not.
    pub fn unacked_len(&self) -> usize {
        self.inner.lock().unacked.len()
    }

    /// Returns declared queue names.
    pub fn declared_queues(&self) -> Vec<String> {
        self.inner.lock().declared.clone()
    }

    /// Returns the prefetch bound (0 means unbounded).
    pub fn prefetch(&self) -> u16 {
        self.inner.lock().prefetch
    }

    /// Returns the active consumer tag.
    pub fn consumer_tag(&self) -> Option<String> {
        self.inner.lock().consumer_tag.clone()
    }

    /// Returns `true` once the consumer was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.lock().cancelled
    }

    /// Returns `true` once the channel was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(BrokerError::Closed);
        }
        if !inner.declared.iter().any(|q| q == queue) {
            inner.declared.push(queue.to_string());
        }
        Ok(())
    }

    async fn set_prefetch(&self, prefetch: u16) -> BrokerResult<()> {
        self.update(|inner| inner.prefetch = prefetch);
        Ok(())
    }

    async fn consume(&self, _queue: &str, consumer_tag: &str) -> BrokerResult<()> {
        self.update(|inner| {
            if inner.closed {
                return Err(BrokerError::Closed);
            }
            inner.consumer_tag = Some(consumer_tag.to_string());
            inner.cancelled = false;
            Ok(())
        })
    }

    async fn recv(&self) -> BrokerResult<Option<Delivery>> {
        loop {
            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(BrokerError::Closed);
                }
                inner.fill();
                if let Some(delivery) = inner.buffered.pop_front() {
                    return Ok(Some(delivery));
                }
                if inner.consumer_tag.is_none() {
                    return if inner.cancelled {
                        Ok(None)
                    } else {
                        Err(BrokerError::NotConsuming)
                    };
                }
                if inner.ended && inner.ready.is_empty() {
                    return Ok(None);
                }
            }
            self.notify.notified().await;
        }
    }

    async fn drain_buffered(&self) -> BrokerResult<Vec<Delivery>> {
        Ok(self.inner.lock().buffered.drain(..).collect())
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        self.update(|inner| {
            inner
                .unacked
                .remove(&delivery_tag)
                .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;
            inner.settlements.push(Settlement::Ack(delivery_tag));
            Ok(())
        })
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> BrokerResult<()> {
        self.update(|inner| {
            let delivery = inner
                .unacked
                .remove(&delivery_tag)
                .ok_or(BrokerError::UnknownDeliveryTag(delivery_tag))?;
            inner.settlements.push(Settlement::Nack {
                delivery_tag,
                requeue,
            });
            if requeue {
                inner.requeue(delivery);
            }
            Ok(())
        })
    }

    async fn cancel(&self, _consumer_tag: &str) -> BrokerResult<()> {
        self.update(|inner| {
            inner.consumer_tag = None;
            inner.cancelled = true;
        });
        Ok(())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.update(|inner| {
            inner.buffered.clear();
            let mut unacked: Vec<Delivery> = inner.unacked.drain().map(|(_, d)| d).collect();
            unacked.sort_by_key(|d| std::cmp::Reverse(d.delivery_tag));
            for delivery in unacked {
                inner.requeue(delivery);
            }
            inner.closed = true;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requires_consume() {
        let channel = MemoryChannel::new();
        channel.publish_body("m-1", "{}");
        assert!(matches!(channel.recv().await, Err(BrokerError::NotConsuming)));
    }

    #[tokio::test]
    async fn test_tags_and_redelivery() {
        let channel = MemoryChannel::new();
        channel.consume("jobs", "c-1").await.unwrap();
        channel.publish_body("m-1", "{}");

        let first = channel.recv().await.unwrap().unwrap();
        assert_eq!(first.delivery_tag, 1);
        assert!(!first.redelivered);

        channel.nack(first.delivery_tag, true).await.unwrap();
        let second = channel.recv().await.unwrap().unwrap();
        assert_eq!(second.delivery_tag, 2);
        assert!(second.redelivered);
        assert_eq!(second.message_id.as_deref(), Some("m-1"));

        channel.ack(second.delivery_tag).await.unwrap();
        assert!(matches!(
            channel.ack(second.delivery_tag).await,
            Err(BrokerError::UnknownDeliveryTag(2))
        ));
    }

    #[tokio::test]
    async fn test_prefetch_bounds_unacked() {
        let channel = MemoryChannel::new();
        channel.set_prefetch(2).await.unwrap();
        channel.consume("jobs", "c-1").await.unwrap();
        for i in 0..5 {
            channel.publish_body(format!("m-{i}"), "{}");
        }

        let a = channel.recv().await.unwrap().unwrap();
        let _b = channel.recv().await.unwrap().unwrap();
        assert!(channel.drain_buffered().await.unwrap().is_empty());
        assert_eq!(channel.unacked_len(), 2);

        channel.ack(a.delivery_tag).await.unwrap();
        assert_eq!(channel.drain_buffered().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_end_stream_and_close() {
        let channel = MemoryChannel::new();
        channel.consume("jobs", "c-1").await.unwrap();
        channel.publish_body("m-1", "{}");
        channel.end_stream();

        let delivery = channel.recv().await.unwrap().unwrap();
        assert!(channel.recv().await.unwrap().is_none());

        channel.close().await.unwrap();
        assert!(channel.is_closed());
        assert_eq!(channel.unacked_len(), 0);
        assert_eq!(channel.ready_len(), 1);
        assert!(matches!(channel.recv().await, Err(BrokerError::Closed)));
        drop(delivery);
    }
}
