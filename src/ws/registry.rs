use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::ServerMessage;

/// Outbound messages a socket may have queued before it counts as dead.
pub const OUTBOUND_QUEUE: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-local handle to one socket: messages pushed here are written out by the
/// socket's writer task. A failed send means the writer is gone or cannot keep up.
///
/// Clones share one close signal, so the session behind a connection notices when the
/// registry gives up on it.
#[derive(Clone, Debug)]
pub struct Connection {
    id: ConnectionId,
    tx: mpsc::Sender<ServerMessage>,
    closed: CancellationToken,
}

impl Connection {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            tx,
            closed: CancellationToken::new(),
        }
    }

    /// A connection plus the receiving end its writer would drain.
    pub fn channel() -> (Self, mpsc::Receiver<ServerMessage>) {
        Self::bounded(OUTBOUND_QUEUE)
    }

    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a message without waiting. A full queue fails like a closed one.
    pub fn send(&self, msg: ServerMessage) -> Result<(), ServerMessage> {
        self.tx.try_send(msg).map_err(TrySendError::into_inner)
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed by the registry.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

#[derive(Default)]
struct Inner {
    /// room id → connections in that room
    rooms: HashMap<String, HashMap<ConnectionId, Connection>>,
    /// connection → (room id, user id)
    identities: HashMap<ConnectionId, (String, String)>,
}

/// Live connections of this process, grouped by room.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, conn: Connection, room_id: &str, user_id: &str) {
        let mut inner = self.inner.write().await;
        inner
            .identities
            .insert(conn.id(), (room_id.to_string(), user_id.to_string()));
        inner
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn.id(), conn);
        debug!("Registered user {} in room {}", user_id, room_id);
    }

    /// Removes the connection and returns its (room id, user id), or `None` if it was
    /// not registered. A room left without connections is dropped from the registry.
    pub async fn unregister(&self, conn_id: ConnectionId) -> Option<(String, String)> {
        let mut inner = self.inner.write().await;
        let (room_id, user_id) = inner.identities.remove(&conn_id)?;
        if let Some(conns) = inner.rooms.get_mut(&room_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                inner.rooms.remove(&room_id);
            }
        }
        debug!("Unregistered user {} from room {}", user_id, room_id);
        Some((room_id, user_id))
    }

    /// Sends `msg` to every connection in the room except `exclude`.
    ///
    /// Iterates over a snapshot taken under the lock. Connections whose send fails are
    /// closed and unregistered afterwards; delivery to the others is unaffected. Returns
    /// the number of connections the message was handed to.
    pub async fn broadcast(&self, room_id: &str, msg: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let targets: Vec<Connection> = {
            let inner = self.inner.read().await;
            match inner.rooms.get(room_id) {
                Some(conns) => conns
                    .values()
                    .filter(|c| Some(c.id()) != exclude)
                    .cloned()
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in targets {
            match conn.send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    conn.close();
                    dead.push(conn.id());
                }
            }
        }

        for conn_id in dead {
            if let Some((_, user_id)) = self.unregister(conn_id).await {
                warn!("Dropped dead connection of user {} in room {}", user_id, room_id);
            }
        }
        delivered
    }

    pub async fn count_local(&self, room_id: &str) -> usize {
        let inner = self.inner.read().await;
        inner.rooms.get(room_id).map_or(0, |conns| conns.len())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.identities.len()
    }

    pub async fn room_count(&self) -> usize {
        self.inner.read().await.rooms.len()
    }

    /// Closes and drops every connection in the room. Their sessions end and tear down.
    pub async fn close_room(&self, room_id: &str) -> usize {
        let mut inner = self.inner.write().await;
        let Some(conns) = inner.rooms.remove(room_id) else {
            return 0;
        };
        for (conn_id, conn) in &conns {
            conn.close();
            inner.identities.remove(conn_id);
        }
        info!("Closed {} connections in room {}", conns.len(), room_id);
        conns.len()
    }

    /// Closes and drops every connection.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        let n = inner.identities.len();
        for conn in inner.rooms.values().flat_map(HashMap::values) {
            conn.close();
        }
        inner.rooms.clear();
        inner.identities.clear();
        info!("Connection registry closed {} connections", n);
        n
    }
}
