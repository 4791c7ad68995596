use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{info, warn};

use super::{keys, RoomStore, StoreError};
use crate::models::CursorState;

/// Room store backed by Redis, shared by every server process.
#[derive(Clone)]
pub struct RedisRoomStore {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisRoomStore {
    /// Connect to Redis and verify the connection with a PING.
    pub async fn connect(client: &redis::Client, ttl: Duration) -> Result<Self, StoreError> {
        let mut conn = ConnectionManager::new(client.clone()).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis room store connected");
        Ok(Self { conn, ttl })
    }

    fn ttl_secs(&self) -> i64 {
        self.ttl.as_secs() as i64
    }
}

#[async_trait]
impl RoomStore for RedisRoomStore {
    async fn exists(&self, room_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(keys::document(room_id)).await?;
        Ok(exists)
    }

    async fn init_document(&self, room_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(keys::document(room_id), "", self.ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn get_document(&self, room_id: &str) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let document: Option<String> = conn.get(keys::document(room_id)).await?;
        Ok(document.unwrap_or_default())
    }

    async fn set_document(&self, room_id: &str, text: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(keys::document(room_id))
            .arg(text)
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn add_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(keys::members(room_id), user_id).await?;
        Ok(())
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.srem(keys::members(room_id), user_id).await?;
        Ok(())
    }

    async fn list_members(&self, room_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut conn = self.conn.clone();
        let members: HashSet<String> = conn.smembers(keys::members(room_id)).await?;
        Ok(members)
    }

    async fn set_cursor(&self, room_id: &str, user_id: &str, cursor: &CursorState) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(cursor)
            .map_err(|e| StoreError::Unavailable(format!("failed to encode cursor: {}", e)))?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.hset(keys::cursors(room_id), user_id, encoded).await?;
        Ok(())
    }

    async fn remove_cursor(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.hdel(keys::cursors(room_id), user_id).await?;
        Ok(())
    }

    async fn list_cursors(&self, room_id: &str) -> Result<HashMap<String, CursorState>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> = conn.hgetall(keys::cursors(room_id)).await?;

        let mut cursors = HashMap::with_capacity(raw.len());
        for (user_id, encoded) in raw {
            match serde_json::from_str::<CursorState>(&encoded) {
                Ok(cursor) => {
                    cursors.insert(user_id, cursor);
                }
                Err(e) => warn!("Skipping malformed cursor for {} in room {}: {}", user_id, room_id, e),
            }
        }
        Ok(cursors)
    }

    async fn refresh_ttl(&self, room_id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let ttl = self.ttl_secs();
        let _: () = redis::pipe()
            .expire(keys::document(room_id), ttl)
            .ignore()
            .expire(keys::members(room_id), ttl)
            .ignore()
            .expire(keys::cursors(room_id), ttl)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}
