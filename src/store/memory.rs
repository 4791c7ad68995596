use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{keys, RoomStore, StoreError};
use crate::models::CursorState;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Set(HashSet<String>),
    Cursors(HashMap<String, CursorState>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process room store for single-process deployments and tests.
///
/// Mirrors the Redis key semantics: per-key deadlines measured on the tokio clock,
/// collections disappear when their last entry is removed, expired keys read as absent.
#[derive(Debug)]
pub struct MemoryRoomStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryRoomStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

/// Drops every expired key. Run on room creation, which is the only way the map grows
/// by whole rooms.
fn purge_expired(entries: &mut HashMap<String, Entry>) {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    let purged = before - entries.len();
    if purged > 0 {
        debug!("Purged {} expired room keys", purged);
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|e| e.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn exists(&self, room_id: &str) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, &keys::document(room_id)).is_some())
    }

    async fn init_document(&self, room_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries);
        entries.insert(
            keys::document(room_id),
            Entry {
                value: Value::Text(String::new()),
                expires_at: Some(Instant::now() + self.ttl),
            },
        );
        Ok(())
    }

    async fn get_document(&self, room_id: &str) -> Result<String, StoreError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, &keys::document(room_id)) {
            Some(Entry { value: Value::Text(text), .. }) => Ok(text.clone()),
            _ => Ok(String::new()),
        }
    }

    async fn set_document(&self, room_id: &str, text: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let key = keys::document(room_id);
        let expires_at = live(&mut entries, &key).and_then(|e| e.expires_at);
        entries.insert(
            key,
            Entry {
                value: Value::Text(text.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn add_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let key = keys::members(room_id);
        match live(&mut entries, &key) {
            Some(Entry { value: Value::Set(members), .. }) => {
                members.insert(user_id.to_string());
            }
            _ => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Set(HashSet::from([user_id.to_string()])),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let key = keys::members(room_id);
        let now_empty = match live(&mut entries, &key) {
            Some(Entry { value: Value::Set(members), .. }) => {
                members.remove(user_id);
                members.is_empty()
            }
            _ => false,
        };
        if now_empty {
            entries.remove(&key);
        }
        Ok(())
    }

    async fn list_members(&self, room_id: &str) -> Result<HashSet<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, &keys::members(room_id)) {
            Some(Entry { value: Value::Set(members), .. }) => Ok(members.clone()),
            _ => Ok(HashSet::new()),
        }
    }

    async fn set_cursor(&self, room_id: &str, user_id: &str, cursor: &CursorState) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let key = keys::cursors(room_id);
        match live(&mut entries, &key) {
            Some(Entry { value: Value::Cursors(cursors), .. }) => {
                cursors.insert(user_id.to_string(), cursor.clone());
            }
            _ => {
                entries.insert(
                    key,
                    Entry {
                        value: Value::Cursors(HashMap::from([(user_id.to_string(), cursor.clone())])),
                        expires_at: None,
                    },
                );
            }
        }
        Ok(())
    }

    async fn remove_cursor(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let key = keys::cursors(room_id);
        let now_empty = match live(&mut entries, &key) {
            Some(Entry { value: Value::Cursors(cursors), .. }) => {
                cursors.remove(user_id);
                cursors.is_empty()
            }
            _ => false,
        };
        if now_empty {
            entries.remove(&key);
        }
        Ok(())
    }

    async fn list_cursors(&self, room_id: &str) -> Result<HashMap<String, CursorState>, StoreError> {
        let mut entries = self.entries.lock().await;
        match live(&mut entries, &keys::cursors(room_id)) {
            Some(Entry { value: Value::Cursors(cursors), .. }) => Ok(cursors.clone()),
            _ => Ok(HashMap::new()),
        }
    }

    async fn refresh_ttl(&self, room_id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let deadline = Instant::now() + self.ttl;
        for key in [keys::document(room_id), keys::members(room_id), keys::cursors(room_id)] {
            if let Some(entry) = live(&mut entries, &key) {
                entry.expires_at = Some(deadline);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn cursor(line: u32, column: u32) -> CursorState {
        CursorState {
            line,
            column,
            color: "#1C978F".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn room_expires_without_refresh() {
        let store = MemoryRoomStore::new(TTL);
        store.init_document("abc123").await.unwrap();
        assert!(store.exists("abc123").await.unwrap());

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(!store.exists("abc123").await.unwrap());
        assert_eq!(store.get_document("abc123").await.unwrap(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_active_room_alive() {
        let store = MemoryRoomStore::new(TTL);
        store.init_document("abc123").await.unwrap();
        store.add_member("abc123", "u1").await.unwrap();

        tokio::time::advance(TTL - Duration::from_secs(5)).await;
        store.refresh_ttl("abc123").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        assert!(store.exists("abc123").await.unwrap());
        assert!(store.list_members("abc123").await.unwrap().contains("u1"));

        tokio::time::advance(TTL).await;
        assert!(!store.exists("abc123").await.unwrap());
        assert!(store.list_members("abc123").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn creating_a_room_sweeps_expired_rooms() {
        let store = MemoryRoomStore::new(TTL);
        for i in 0..100 {
            let room = format!("old{:03}", i);
            store.init_document(&room).await.unwrap();
            store.add_member(&room, "u1").await.unwrap();
            store.set_cursor(&room, "u1", &cursor(1, 0)).await.unwrap();
            store.refresh_ttl(&room).await.unwrap();
        }
        store.init_document("keep01").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        store.refresh_ttl("keep01").await.unwrap();
        assert_eq!(store.entries.lock().await.len(), 301);

        tokio::time::advance(Duration::from_secs(31)).await;
        store.init_document("new001").await.unwrap();

        let entries = store.entries.lock().await;
        assert_eq!(entries.len(), 2);
        assert!(entries.contains_key(&keys::document("keep01")));
        assert!(entries.contains_key(&keys::document("new001")));
    }

    #[tokio::test(start_paused = true)]
    async fn set_document_keeps_expiry() {
        let store = MemoryRoomStore::new(TTL);
        store.init_document("abc123").await.unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        store.set_document("abc123", "fn main() {}").await.unwrap();
        assert_eq!(store.get_document("abc123").await.unwrap(), "fn main() {}");

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!store.exists("abc123").await.unwrap());
    }

    #[tokio::test]
    async fn cursor_moves_overwrite() {
        let store = MemoryRoomStore::new(TTL);
        store.set_cursor("abc123", "u1", &cursor(2, 0)).await.unwrap();
        store.set_cursor("abc123", "u1", &cursor(5, 3)).await.unwrap();

        let cursors = store.list_cursors("abc123").await.unwrap();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors["u1"], cursor(5, 3));
    }

    #[tokio::test]
    async fn empty_collections_disappear() {
        let store = MemoryRoomStore::new(TTL);
        store.add_member("abc123", "u1").await.unwrap();
        store.set_cursor("abc123", "u1", &cursor(1, 0)).await.unwrap();
        store.remove_member("abc123", "u1").await.unwrap();
        store.remove_cursor("abc123", "u1").await.unwrap();

        let entries = store.entries.lock().await;
        assert!(!entries.contains_key(&keys::members("abc123")));
        assert!(!entries.contains_key(&keys::cursors("abc123")));
    }

    #[tokio::test]
    async fn refresh_does_not_create_missing_keys() {
        let store = MemoryRoomStore::new(TTL);
        store.init_document("abc123").await.unwrap();
        store.refresh_ttl("abc123").await.unwrap();

        let entries = store.entries.lock().await;
        assert_eq!(entries.len(), 1);
    }
}
