//! Shared room state: document snapshot, member set and cursor map per room.
//!
//! Every process talks to the same store. Nothing here is versioned, so concurrent
//! writers race and the last write applied wins.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::models::CursorState;

pub use self::memory::MemoryRoomStore;
pub use self::redis::RedisRoomStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("room store unavailable: {0}")]
    Unavailable(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(e: ::redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Key layout shared by every backend.
pub mod keys {
    pub fn document(room_id: &str) -> String {
        format!("room:{}:code", room_id)
    }

    pub fn members(room_id: &str) -> String {
        format!("room:{}:users", room_id)
    }

    pub fn cursors(room_id: &str) -> String {
        format!("room:{}:cursors", room_id)
    }

    /// Bus channel for a room. Lives in a different namespace than the store keys.
    pub fn channel(room_id: &str) -> String {
        format!("room_channel:{}", room_id)
    }
}

/// Keyed store holding the state of every room.
///
/// A room exists iff its document key is present. Collections with no entries do not
/// exist as keys, and `refresh_ttl` only touches keys that are present.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn exists(&self, room_id: &str) -> Result<bool, StoreError>;

    /// Writes an empty document with the configured TTL.
    async fn init_document(&self, room_id: &str) -> Result<(), StoreError>;

    /// Returns an empty string when the room has no document.
    async fn get_document(&self, room_id: &str) -> Result<String, StoreError>;

    /// Unconditional overwrite. Keeps the key's current expiry.
    async fn set_document(&self, room_id: &str, text: &str) -> Result<(), StoreError>;

    async fn add_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn list_members(&self, room_id: &str) -> Result<HashSet<String>, StoreError>;

    async fn set_cursor(&self, room_id: &str, user_id: &str, cursor: &CursorState) -> Result<(), StoreError>;

    async fn remove_cursor(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;

    async fn list_cursors(&self, room_id: &str) -> Result<HashMap<String, CursorState>, StoreError>;

    /// Resets expiry on the document, member and cursor keys together.
    async fn refresh_ttl(&self, room_id: &str) -> Result<(), StoreError>;
}
