use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::ConnectionRegistry;
use crate::bus::{BusError, MessageBus, Payloads};
use crate::models::ServerMessage;
use crate::store::keys;

/// One room's channel subscription in this process.
struct Subscription {
    cancel: CancellationToken,
    listener: JoinHandle<()>,
}

impl Subscription {
    fn is_live(&self) -> bool {
        !self.listener.is_finished()
    }

    /// Cancels the listener and waits for it. Cancellation is the normal way out.
    async fn stop(self, room_id: &str) {
        self.cancel.cancel();
        match self.listener.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => error!("Listener for room {} ended abnormally: {}", room_id, e),
        }
    }
}

/// Relays room channels from the bus into the local [`ConnectionRegistry`].
///
/// Local sockets only ever receive room events through this path, so the sender of an
/// event gets it back like everybody else.
pub struct BroadcastBridge {
    bus: Arc<dyn MessageBus>,
    registry: Arc<ConnectionRegistry>,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl BroadcastBridge {
    pub fn new(bus: Arc<dyn MessageBus>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            bus,
            registry,
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a listener for the room unless one is already running.
    pub async fn subscribe(&self, room_id: &str) -> Result<(), BusError> {
        let mut subs = self.subscriptions.lock().await;
        if subs.get(room_id).is_some_and(Subscription::is_live) {
            return Ok(());
        }

        let channel = keys::channel(room_id);
        let payloads = self.bus.subscribe(&channel).await?;
        let cancel = CancellationToken::new();
        let listener = tokio::spawn(listen(
            room_id.to_string(),
            payloads,
            self.registry.clone(),
            cancel.clone(),
        ));

        if let Some(stale) = subs.insert(room_id.to_string(), Subscription { cancel, listener }) {
            warn!("Replacing finished listener for room {}", room_id);
            stale.stop(room_id).await;
        }
        info!("Subscribed to channel: {}", channel);
        Ok(())
    }

    /// Stops the room's listener and releases its channel once no local connection is
    /// left in the room. The count is re-read under the subscription lock so a concurrent
    /// join cannot lose its listener. Returns whether a subscription was released.
    pub async fn unsubscribe(&self, room_id: &str) -> bool {
        let mut subs = self.subscriptions.lock().await;
        if self.registry.count_local(room_id).await > 0 {
            debug!("Room {} still has local connections, keeping its listener", room_id);
            return false;
        }
        match subs.remove(room_id) {
            Some(sub) => {
                sub.stop(room_id).await;
                info!("Unsubscribed from room: {}", room_id);
                true
            }
            None => false,
        }
    }

    /// Serializes and publishes an event. Local delivery happens later, via the listener.
    pub async fn publish(&self, room_id: &str, msg: &ServerMessage) -> Result<(), BusError> {
        let payload = serde_json::to_string(msg)
            .map_err(|e| BusError::Unavailable(format!("failed to encode {}: {}", msg.kind(), e)))?;
        let channel = keys::channel(room_id);
        self.bus.publish(&channel, payload).await?;
        debug!("Published to {}: {}", channel, msg.kind());
        Ok(())
    }

    #[cfg(test)]
    pub async fn is_subscribed(&self, room_id: &str) -> bool {
        self.subscriptions
            .lock()
            .await
            .get(room_id)
            .is_some_and(Subscription::is_live)
    }

    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.lock().await.len()
    }

    /// Stops every listener. Called once at process shutdown.
    pub async fn shutdown(&self) {
        let subs: Vec<(String, Subscription)> = self.subscriptions.lock().await.drain().collect();
        let n = subs.len();
        for (room_id, sub) in subs {
            sub.stop(&room_id).await;
        }
        info!("Broadcast bridge stopped {} subscriptions", n);
    }
}

async fn listen(room_id: String, mut payloads: Payloads, registry: Arc<ConnectionRegistry>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Listener for room {} cancelled", room_id);
                return;
            }
            next = payloads.next() => {
                let Some(payload) = next else {
                    // Sessions in this room would stop hearing from it; end them.
                    let n = registry.close_room(&room_id).await;
                    warn!("Channel for room {} closed, dropped {} local connections", room_id, n);
                    return;
                };
                match serde_json::from_str::<ServerMessage>(&payload) {
                    Ok(msg) => {
                        registry.broadcast(&room_id, &msg, None).await;
                    }
                    Err(e) => warn!("Dropping malformed bus message for room {}: {}", room_id, e),
                }
            }
        }
    }
}
