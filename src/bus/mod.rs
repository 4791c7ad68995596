//! Cross-process publish/subscribe used to fan room events out to every server process.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("message bus unavailable: {0}")]
    Unavailable(String),
}

impl From<::redis::RedisError> for BusError {
    fn from(e: ::redis::RedisError) -> Self {
        BusError::Unavailable(e.to_string())
    }
}

/// Raw payloads received on one channel. Dropping the stream releases the subscription.
pub type Payloads = BoxStream<'static, String>;

/// A broadcast bus. Each channel delivers its messages to every subscriber, the
/// publisher's own subscriptions included, in publish order.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), BusError>;

    async fn subscribe(&self, channel: &str) -> Result<Payloads, BusError>;
}
