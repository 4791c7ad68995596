//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::models::{CursorState, ServerMessage};
use crate::store::{MemoryRoomStore, RoomStore, StoreError};

/// Waits briefly for the next outbound message.
pub async fn recv_timeout(rx: &mut mpsc::Receiver<ServerMessage>) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.ok().flatten()
}

/// Collects whatever arrives until the stream stays quiet for a moment.
pub async fn drain<T>(stream: &mut BoxStream<'static, T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(Some(item)) = tokio::time::timeout(Duration::from_millis(100), stream.next()).await {
        items.push(item);
    }
    items
}

/// A stand-in for a socket's inbound text frames. Dropping the sender ends the stream,
/// like a client closing its socket.
pub fn inbound() -> (mpsc::UnboundedSender<String>, BoxStream<'static, String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let frames = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|frame| (frame, rx)) });
    (tx, frames.boxed())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Exists,
    SetDocument,
    AddMember,
    RemoveMember,
    SetCursor,
    RemoveCursor,
    RefreshTtl,
}

/// Memory store that fails selected operations a set number of times.
pub struct FlakyStore {
    inner: MemoryRoomStore,
    failures: Mutex<HashMap<StoreOp, usize>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryRoomStore::new(Duration::from_secs(3600)),
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail(&self, op: StoreOp, times: usize) {
        self.failures.lock().unwrap().insert(op, times);
    }

    fn check(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(StoreError::Unavailable(format!("injected {:?} failure", op)))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RoomStore for FlakyStore {
    async fn exists(&self, room_id: &str) -> Result<bool, StoreError> {
        self.check(StoreOp::Exists)?;
        self.inner.exists(room_id).await
    }

    async fn init_document(&self, room_id: &str) -> Result<(), StoreError> {
        self.inner.init_document(room_id).await
    }

    async fn get_document(&self, room_id: &str) -> Result<String, StoreError> {
        self.inner.get_document(room_id).await
    }

    async fn set_document(&self, room_id: &str, text: &str) -> Result<(), StoreError> {
        self.check(StoreOp::SetDocument)?;
        self.inner.set_document(room_id, text).await
    }

    async fn add_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check(StoreOp::AddMember)?;
        self.inner.add_member(room_id, user_id).await
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check(StoreOp::RemoveMember)?;
        self.inner.remove_member(room_id, user_id).await
    }

    async fn list_members(&self, room_id: &str) -> Result<HashSet<String>, StoreError> {
        self.inner.list_members(room_id).await
    }

    async fn set_cursor(&self, room_id: &str, user_id: &str, cursor: &CursorState) -> Result<(), StoreError> {
        self.check(StoreOp::SetCursor)?;
        self.inner.set_cursor(room_id, user_id, cursor).await
    }

    async fn remove_cursor(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        self.check(StoreOp::RemoveCursor)?;
        self.inner.remove_cursor(room_id, user_id).await
    }

    async fn list_cursors(&self, room_id: &str) -> Result<HashMap<String, CursorState>, StoreError> {
        self.inner.list_cursors(room_id).await
    }

    async fn refresh_ttl(&self, room_id: &str) -> Result<(), StoreError> {
        self.check(StoreOp::RefreshTtl)?;
        self.inner.refresh_ttl(room_id).await
    }
}
