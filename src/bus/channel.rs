//! Publish/subscribe transport seam
//!
//! `EventChannel` is the generic channel the bus client rides on:
//! publish bytes to a topic, subscribe to a topic as a byte stream.
//! Delivery is at-most-once per subscriber connection — a reconnect
//! loses in-flight messages, and no durability layer is added here.
//!
//! `MemoryChannel` is the in-process implementation over tokio broadcast
//! channels. A networked implementation (NATS, Redis pub/sub) plugs in
//! behind the same trait.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::StreamExt;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

/// Stream of raw event payloads from a topic subscription
pub type EventStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// Generic publish/subscribe channel
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Write one payload to a topic. Reports transport failure to the
    /// caller; never retries internally.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;

    /// Open a subscription to a topic.
    async fn subscribe(&self, topic: &str) -> Result<EventStream>;
}

/// In-process channel over per-topic tokio broadcast senders
pub struct MemoryChannel {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<Bytes>>>>,
    capacity: usize,
}

impl MemoryChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    async fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        if let Some(sender) = self.topics.read().await.get(topic) {
            return sender.clone();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for MemoryChannel {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        let sender = self.sender(topic).await;
        // A publish with no live subscribers is not a failure; the event
        // is simply dropped, matching fire-and-forget semantics.
        let _ = sender.send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<EventStream> {
        let receiver = self.sender(topic).await.subscribe();
        // Lagged subscribers lose in-flight messages rather than erroring
        // the stream (at-most-once per connection).
        let stream = BroadcastStream::new(receiver).filter_map(|item| async move { item.ok() });
        Ok(Box::pin(stream))
    }
}

/// Channel that fails every publish; used to exercise transport-failure
/// paths in tests.
pub struct UnavailableChannel;

#[async_trait]
impl EventChannel for UnavailableChannel {
    async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<()> {
        Err(Error::Channel("transport unavailable".to_string()))
    }

    async fn subscribe(&self, _topic: &str) -> Result<EventStream> {
        Err(Error::Channel("transport unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let channel = MemoryChannel::default();
        let mut stream = channel.subscribe("memory.sync").await.unwrap();

        channel
            .publish("memory.sync", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let received = stream.next().await.unwrap();
        assert_eq!(&received[..], b"hello");
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let channel = MemoryChannel::default();
        let mut first = channel.subscribe("t").await.unwrap();
        let mut second = channel.subscribe("t").await.unwrap();

        channel.publish("t", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(&first.next().await.unwrap()[..], b"x");
        assert_eq!(&second.next().await.unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let channel = MemoryChannel::default();
        channel
            .publish("empty.topic", Bytes::from_static(b"dropped"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let channel = MemoryChannel::default();
        let mut a = channel.subscribe("topic.a").await.unwrap();

        channel
            .publish("topic.b", Bytes::from_static(b"b"))
            .await
            .unwrap();
        channel
            .publish("topic.a", Bytes::from_static(b"a"))
            .await
            .unwrap();

        // Only topic.a traffic arrives
        assert_eq!(&a.next().await.unwrap()[..], b"a");
    }

    #[tokio::test]
    async fn test_per_subscriber_delivery_preserves_publish_order() {
        let channel = MemoryChannel::default();
        let mut stream = channel.subscribe("t").await.unwrap();

        for i in 0..5u8 {
            channel.publish("t", Bytes::from(vec![i])).await.unwrap();
        }
        for i in 0..5u8 {
            assert_eq!(stream.next().await.unwrap()[0], i);
        }
    }

    #[tokio::test]
    async fn test_unavailable_channel_reports_failure() {
        let channel = UnavailableChannel;
        let result = channel.publish("t", Bytes::new()).await;
        assert!(matches!(result, Err(Error::Channel(_))));
    }
}
