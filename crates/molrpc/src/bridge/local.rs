//! In-process broker.
//!
//! Fan-out pub/sub over unbounded tokio channels. Each subscription owns a
//! guard that removes its sender when the subscription is dropped, so
//! ephemeral response channels do not accumulate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::transport::{PubSub, Subscription, TransportError};

#[derive(Default)]
struct Channels {
    senders: DashMap<String, Vec<(u64, mpsc::UnboundedSender<String>)>>,
    next_id: AtomicU64,
}

impl Channels {
    fn remove(&self, channel: &str, id: u64) {
        if let Some(mut entry) = self.senders.get_mut(channel) {
            entry.retain(|(sid, _)| *sid != id);
        }
        self.senders.remove_if(channel, |_, subs| subs.is_empty());
    }
}

/// Cheaply cloneable handle; clones share the same channels.
#[derive(Clone, Default)]
pub struct LocalBroker {
    channels: Arc<Channels>,
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .senders
            .get(channel)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.senders.len()
    }
}

struct Unsubscribe {
    channels: Arc<Channels>,
    channel: String,
    id: u64,
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.channels.remove(&self.channel, self.id);
        tracing::trace!(channel = %self.channel, "Unsubscribed");
    }
}

#[async_trait]
impl PubSub for LocalBroker {
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.channels.next_id.fetch_add(1, Ordering::Relaxed);
        self.channels
            .senders
            .entry(channel.to_string())
            .or_default()
            .push((id, tx));
        tracing::trace!(channel, "Subscribed");

        let guard = Unsubscribe {
            channels: Arc::clone(&self.channels),
            channel: channel.to_string(),
            id,
        };
        let messages = futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
            rx.recv().await.map(|msg| (msg, (rx, guard)))
        })
        .boxed();
        Ok(Subscription::new(channel, messages))
    }

    async fn publish(&self, channel: &str, message: String) -> Result<usize, TransportError> {
        let Some(subs) = self.channels.senders.get(channel) else {
            tracing::trace!(channel, "Published to channel with no subscribers");
            return Ok(0);
        };
        let delivered = subs
            .iter()
            .filter(|(_, tx)| tx.send(message.clone()).is_ok())
            .count();
        tracing::trace!(channel, delivered, "Published");
        Ok(delivered)
    }
}
