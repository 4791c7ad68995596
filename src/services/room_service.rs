use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::store::{RoomStore, StoreError};
use crate::utils::random::random_hex;

/// Maximum number of identifiers tried before room creation gives up.
pub const MAX_CREATE_ATTEMPTS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("failed to generate a unique room id after {attempts} attempts")]
    CreationExhausted { attempts: usize },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Produces candidate room identifiers.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Room creation and existence checks over the shared store.
#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn RoomStore>,
    generate_id: IdGenerator,
}

impl RoomService {
    pub fn new(store: Arc<dyn RoomStore>, code_length: usize) -> Self {
        Self::with_generator(store, Arc::new(move || random_hex(code_length)))
    }

    pub fn with_generator(store: Arc<dyn RoomStore>, generate_id: IdGenerator) -> Self {
        Self { store, generate_id }
    }

    /// Creates a room with an empty document, retrying on identifier collisions.
    pub async fn create(&self) -> Result<String, RoomError> {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let room_id = (self.generate_id)();
            if self.store.exists(&room_id).await? {
                warn!("Room id collision on attempt {}: {}", attempt, room_id);
                continue;
            }
            self.store.init_document(&room_id).await?;
            info!("Created room {}", room_id);
            return Ok(room_id);
        }
        Err(RoomError::CreationExhausted {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }

    pub async fn exists(&self, room_id: &str) -> Result<bool, StoreError> {
        self.store.exists(room_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRoomStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Yields "id0", "id1", ... and counts how many were drawn.
    fn sequential_ids() -> (IdGenerator, Arc<AtomicUsize>) {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let generator: IdGenerator = Arc::new(move || format!("id{}", c.fetch_add(1, Ordering::SeqCst)));
        (generator, counter)
    }

    async fn store_with_taken(taken: usize) -> Arc<MemoryRoomStore> {
        let store = Arc::new(MemoryRoomStore::new(Duration::from_secs(60)));
        for i in 0..taken {
            store.init_document(&format!("id{}", i)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn created_room_exists() {
        let store = Arc::new(MemoryRoomStore::new(Duration::from_secs(60)));
        let service = RoomService::new(store.clone(), 6);
        for _ in 0..20 {
            let id = service.create().await.unwrap();
            assert_eq!(id.len(), 6);
            assert!(service.exists(&id).await.unwrap());
            assert_eq!(store.get_document(&id).await.unwrap(), "");
        }
    }

    #[tokio::test]
    async fn tenth_attempt_succeeds_after_nine_collisions() {
        let store = store_with_taken(9).await;
        let (generator, drawn) = sequential_ids();
        let service = RoomService::with_generator(store, generator);

        let id = service.create().await.unwrap();
        assert_eq!(id, "id9");
        assert_eq!(drawn.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn ten_collisions_exhaust_creation() {
        let store = store_with_taken(10).await;
        let (generator, drawn) = sequential_ids();
        let service = RoomService::with_generator(store.clone(), generator);

        let err = service.create().await.unwrap_err();
        assert_eq!(err, RoomError::CreationExhausted { attempts: 10 });
        assert_eq!(drawn.load(Ordering::SeqCst), 10);
        assert!(!store.exists("id10").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn room_is_gone_after_ttl() {
        let store = Arc::new(MemoryRoomStore::new(Duration::from_secs(60)));
        let service = RoomService::new(store, 6);
        let id = service.create().await.unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!service.exists(&id).await.unwrap());
    }
}
