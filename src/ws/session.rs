use futures_util::{FutureExt, Stream, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::registry::Connection;
use super::SyncContext;
use crate::bus::BusError;
use crate::models::{
    ClientMessage, CodeUpdateMessage, CursorMoveMessage, CursorState, InitMessage, ServerMessage,
    UserJoinedMessage, UserLeftMessage,
};
use crate::store::StoreError;
use crate::utils::random;

/// Close code sent when the requested room does not exist.
pub const CLOSE_ROOM_NOT_FOUND: u16 = 4004;
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;
pub const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("room not found")]
    RoomNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection dropped by the server")]
    Evicted,
    #[error("server shutting down")]
    ShuttingDown,
    #[error("session fault: {0}")]
    Fault(String),
}

impl SessionError {
    pub fn close_code(&self) -> u16 {
        match self {
            SessionError::RoomNotFound => CLOSE_ROOM_NOT_FOUND,
            SessionError::ConnectionClosed => CLOSE_NORMAL,
            SessionError::ShuttingDown => CLOSE_GOING_AWAY,
            SessionError::Evicted => CLOSE_TRY_AGAIN_LATER,
            _ => CLOSE_INTERNAL_ERROR,
        }
    }

    /// Whether the client should be told about this error before the socket closes.
    pub fn is_reportable(&self) -> bool {
        !matches!(
            self,
            SessionError::RoomNotFound
                | SessionError::ConnectionClosed
                | SessionError::Evicted
                | SessionError::ShuttingDown
        )
    }
}

/// One connected client in one room, between join and teardown.
pub struct Session {
    ctx: Arc<SyncContext>,
    room_id: String,
    user_id: String,
    color: String,
    conn: Connection,
}

impl Session {
    /// Validates the room, assigns an identity, registers the connection and sends the
    /// snapshot. If anything fails after registration the session is torn down before
    /// the error is returned.
    pub async fn join(ctx: Arc<SyncContext>, room_id: &str, conn: Connection) -> Result<Session, SessionError> {
        match ctx.store.exists(room_id).await {
            Ok(true) => {}
            Ok(false) => {
                info!("Rejected connection to missing room {}", room_id);
                return Err(SessionError::RoomNotFound);
            }
            Err(e) => {
                let e = SessionError::from(e);
                error!("Could not look up room {}: {}", room_id, e);
                report(&conn, &e);
                return Err(e);
            }
        }

        let session = Session {
            ctx,
            room_id: room_id.to_string(),
            user_id: random::user_id(),
            color: random::user_color(),
            conn,
        };
        session
            .ctx
            .registry
            .register(session.conn.clone(), &session.room_id, &session.user_id)
            .await;

        match session.enter().await {
            Ok(()) => {
                info!("User {} joined room {}", session.user_id, session.room_id);
                Ok(session)
            }
            Err(e) => {
                error!("User {} failed to join room {}: {}", session.user_id, session.room_id, e);
                report(&session.conn, &e);
                session.close().await;
                Err(e)
            }
        }
    }

    async fn enter(&self) -> Result<(), SessionError> {
        let ctx = &self.ctx;
        ctx.bridge.subscribe(&self.room_id).await?;
        ctx.store.add_member(&self.room_id, &self.user_id).await?;

        let document = ctx.store.get_document(&self.room_id).await?;
        let mut users: Vec<String> = ctx.store.list_members(&self.room_id).await?.into_iter().collect();
        users.sort();
        let cursors = ctx.store.list_cursors(&self.room_id).await?;

        let init = ServerMessage::Init(InitMessage {
            document,
            users,
            cursors,
            your_user_id: self.user_id.clone(),
            your_color: self.color.clone(),
        });
        self.conn.send(init).map_err(|_| SessionError::ConnectionClosed)?;

        ctx.bridge
            .publish(
                &self.room_id,
                &ServerMessage::UserJoined(UserJoinedMessage {
                    user_id: self.user_id.clone(),
                    color: self.color.clone(),
                }),
            )
            .await?;
        ctx.store.refresh_ttl(&self.room_id).await?;
        Ok(())
    }

    /// Processes inbound frames until the stream ends. Frames that do not decode are
    /// dropped; a store or bus failure ends the loop with an error, as does process
    /// shutdown or the registry closing this connection.
    pub async fn run<S>(&self, mut inbound: S) -> Result<(), SessionError>
    where
        S: Stream<Item = String> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.ctx.stopping.cancelled() => return Err(SessionError::ShuttingDown),
                _ = self.conn.closed() => return Err(SessionError::Evicted),
                frame = inbound.next() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            let msg = match serde_json::from_str::<ClientMessage>(&frame) {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Dropping malformed message from user {} in room {}: {}", self.user_id, self.room_id, e);
                    continue;
                }
            };
            self.handle(msg).await?;
        }
        debug!("Inbound stream of user {} ended", self.user_id);
        Ok(())
    }

    async fn handle(&self, msg: ClientMessage) -> Result<(), SessionError> {
        let ctx = &self.ctx;
        match msg {
            ClientMessage::CodeUpdate(req) => {
                ctx.store.set_document(&self.room_id, &req.code).await?;
                ctx.bridge
                    .publish(
                        &self.room_id,
                        &ServerMessage::CodeUpdate(CodeUpdateMessage {
                            code: req.code,
                            user_id: self.user_id.clone(),
                        }),
                    )
                    .await?;
                ctx.store.refresh_ttl(&self.room_id).await?;
            }
            ClientMessage::CursorMove(req) => {
                if req.line < 1 {
                    warn!("Dropping cursor move with line {} from user {}", req.line, self.user_id);
                    return Ok(());
                }
                let cursor = CursorState {
                    line: req.line,
                    column: req.column,
                    color: self.color.clone(),
                };
                ctx.store.set_cursor(&self.room_id, &self.user_id, &cursor).await?;
                ctx.bridge
                    .publish(
                        &self.room_id,
                        &ServerMessage::CursorMove(CursorMoveMessage {
                            user_id: self.user_id.clone(),
                            line: cursor.line,
                            column: cursor.column,
                            color: cursor.color,
                        }),
                    )
                    .await?;
                ctx.store.refresh_ttl(&self.room_id).await?;
            }
        }
        Ok(())
    }

    /// Tears the session down. Every step runs even if an earlier one fails. Returns
    /// whether this was the room's last local connection and released its subscription.
    pub async fn close(self) -> bool {
        let ctx = &self.ctx;
        if ctx.registry.unregister(self.conn.id()).await.is_none() && !self.conn.is_closed() {
            warn!("Connection of user {} was not registered", self.user_id);
        }
        if let Err(e) = ctx.store.remove_member(&self.room_id, &self.user_id).await {
            error!("Failed to remove user {} from room {}: {}", self.user_id, self.room_id, e);
        }
        if let Err(e) = ctx.store.remove_cursor(&self.room_id, &self.user_id).await {
            error!("Failed to remove cursor of user {} in room {}: {}", self.user_id, self.room_id, e);
        }
        let left = ServerMessage::UserLeft(UserLeftMessage {
            user_id: self.user_id.clone(),
        });
        if let Err(e) = ctx.bridge.publish(&self.room_id, &left).await {
            error!("Failed to announce departure of user {} from room {}: {}", self.user_id, self.room_id, e);
        }
        let released = ctx.registry.count_local(&self.room_id).await == 0 && ctx.bridge.unsubscribe(&self.room_id).await;
        if released {
            info!("Room {} has no local connections left", self.room_id);
        }
        info!("User {} left room {}", self.user_id, self.room_id);
        released
    }
}

/// Tells the client why its session is ending. The socket may already be gone.
fn report(conn: &Connection, e: &SessionError) {
    if e.is_reportable() {
        let _ = conn.send(ServerMessage::error(e.to_string()));
    }
}

/// Runs a joined session to the end: the inbound loop, then teardown, exactly once,
/// whether the loop finished, failed or panicked. Shutdown waits for this to return.
pub async fn drive<S>(session: Session, inbound: S) -> Result<(), SessionError>
where
    S: Stream<Item = String> + Unpin,
{
    let sessions = session.ctx.sessions.clone();
    sessions.track_future(run_and_close(session, inbound)).await
}

async fn run_and_close<S>(session: Session, inbound: S) -> Result<(), SessionError>
where
    S: Stream<Item = String> + Unpin,
{
    let outcome = match AssertUnwindSafe(session.run(inbound)).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Fault("session loop panicked".to_string())),
    };
    match &outcome {
        Err(e) if e.is_reportable() => {
            error!("Session of user {} in room {} failed: {}", session.user_id, session.room_id, e);
            report(&session.conn, e);
        }
        Err(e) => info!("Session of user {} in room {} ended: {}", session.user_id, session.room_id, e),
        Ok(()) => {}
    }
    session.close().await;
    outcome
}
