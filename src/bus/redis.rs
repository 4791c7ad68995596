use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{info, warn};

use super::{BusError, MessageBus, Payloads};

/// Redis pub/sub bus. Publishing shares one managed connection; every subscription
/// opens its own pub/sub connection, closed when the payload stream is dropped.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisBus {
    pub async fn connect(client: &redis::Client) -> Result<Self, BusError> {
        let conn = ConnectionManager::new(client.clone()).await?;
        info!("Redis bus connected");
        Ok(Self {
            client: client.clone(),
            conn,
        })
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Payloads, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let payloads = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("Dropping undecodable payload on {}: {}", msg.get_channel_name(), e);
                    None
                }
            }
        });
        Ok(payloads.boxed())
    }
}
