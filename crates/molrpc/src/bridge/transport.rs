//! Pub/sub transport boundary.
//!
//! The bridge only needs two primitives: subscribe to a named channel and
//! publish one text message to a named channel. Connection management and
//! authentication belong to the implementation.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to subscribe to {channel}: {reason}")]
    Subscribe { channel: String, reason: String },

    #[error("failed to publish to {channel}: {reason}")]
    Publish { channel: String, reason: String },

    #[error("transport closed")]
    Closed,
}

/// Channel-based message broker.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Subscribe to `channel`. Messages published after this returns are
    /// delivered to the subscription; dropping it unsubscribes.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;

    /// Publish `message` to `channel` and return the number of subscribers
    /// it was delivered to. Zero receivers is not an error.
    async fn publish(&self, channel: &str, message: String) -> Result<usize, TransportError>;
}

/// Live subscription to one channel.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, messages: BoxStream<'static, String>) -> Self {
        Self {
            channel: channel.into(),
            messages,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next message, or `None` once the transport has closed the channel.
    pub async fn next_message(&mut self) -> Option<String> {
        self.messages.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
