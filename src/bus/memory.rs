use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use super::{BusError, MessageBus, Payloads};

/// In-process bus for single-process deployments and tests.
#[derive(Debug)]
pub struct MemoryBus {
    /// Topic → broadcast sender.
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    /// Buffer size for broadcast channels.
    capacity: usize,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Number of live subscriptions on a channel.
    #[cfg(test)]
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        let topics = self.topics.lock().await;
        topics.get(channel).map_or(0, |tx| tx.receiver_count())
    }

    #[cfg(test)]
    async fn topic_count(&self) -> usize {
        self.topics.lock().await.len()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut topics = self.topics.lock().await;
        if let Some(tx) = topics.get(channel) {
            // Fails only when nobody listens anymore; the topic goes away then.
            if tx.send(payload).is_err() {
                topics.remove(channel);
            }
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Payloads, BusError> {
        let mut topics = self.topics.lock().await;
        topics.retain(|_, tx| tx.receiver_count() > 0);
        let rx = topics
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        let channel = channel.to_string();

        let payloads = stream::unfold((rx, channel), |(mut rx, channel)| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, (rx, channel))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber on {} lagged, skipped {} messages", channel, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(payloads.boxed())
    }
}
