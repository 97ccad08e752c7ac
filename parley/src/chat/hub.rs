//! In-process pub/sub for chat rooms.
//!
//! Each channel is a tokio broadcast channel, created on first subscribe and dropped once its
//! last receiver unsubscribes. Slow receivers miss events and see `RecvError::Lagged`.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};

use crate::api::models::chat::ChatMessageResponse;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Channel name for a room
pub fn room_channel(room_name: &str) -> String {
    room_name.to_string()
}

#[derive(Debug, Clone)]
pub struct ChatHub {
    channels: Arc<DashMap<String, Sender<ChatMessageResponse>>>,
    capacity: usize,
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ChatHub {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn subscribe(&self, channel: &str) -> Receiver<ChatMessageResponse> {
        let rx = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        debug!(channel, subscribers = self.subscriber_count(channel), "Subscribed");
        rx
    }

    /// Drop `rx` and prune the channel if nobody else listens.
    pub fn unsubscribe(&self, channel: &str, rx: Receiver<ChatMessageResponse>) {
        drop(rx);
        if self.channels.remove_if(channel, |_, tx| tx.receiver_count() == 0).is_some() {
            debug!(channel, "Pruned empty channel");
        }
    }

    /// Returns how many receivers got the event. No subscribers is not an error.
    pub fn publish(&self, channel: &str, event: ChatMessageResponse) -> usize {
        let Some(tx) = self.channels.get(channel) else {
            trace!(channel, "Publish without subscribers");
            return 0;
        };
        tx.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|tx| tx.receiver_count()).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
