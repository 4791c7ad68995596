use std::sync::Arc;
use tracing::{info, warn};

use crate::bus::{MemoryBus, MessageBus, RedisBus};
use crate::config::Config;
use crate::services::RoomService;
use crate::store::{MemoryRoomStore, RedisRoomStore, RoomStore};
use crate::ws::SyncContext;

/// Shared state handed to every HTTP and WebSocket handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: RoomService,
    pub sync: Arc<SyncContext>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RoomStore>, bus: Arc<dyn MessageBus>) -> Self {
        let rooms = RoomService::new(store.clone(), config.room_code_length);
        Self {
            config: Arc::new(config),
            rooms,
            sync: Arc::new(SyncContext::new(store, bus)),
        }
    }

    /// Single-process state: rooms and events never leave this process.
    pub fn in_memory(config: Config) -> Self {
        let store = Arc::new(MemoryRoomStore::new(config.room_ttl()));
        let bus = Arc::new(MemoryBus::new(config.bus_capacity));
        Self::new(config, store, bus)
    }

    /// Connects the backends named by the configuration.
    pub async fn connect(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let Some(redis_url) = config.redis_url.clone() else {
            warn!("No Redis URL configured - rooms are local to this process");
            return Ok(Self::in_memory(config));
        };

        let client = redis::Client::open(redis_url)?;
        let store = RedisRoomStore::connect(&client, config.room_ttl()).await?;
        let bus = RedisBus::connect(&client).await?;
        info!("✓ Redis connection established");
        Ok(Self::new(config, Arc::new(store), Arc::new(bus)))
    }
}
