use std::borrow::Cow;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

use super::registry::Connection;
use super::session::{self, Session, SessionError, CLOSE_NORMAL};
use crate::models::ServerMessage;
use crate::state::AppState;
use crate::utils::abort_guard::AbortOnDrop;

/// How long a finished session waits for its writer to flush before the socket is dropped.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// WebSocket handler
pub async fn websocket_handler(
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("New WebSocket connection attempt for room {}", room_id);
    ws.on_upgrade(move |socket| handle_socket(socket, room_id, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, room_id: String, state: Arc<AppState>) {
    // Split the socket: the writer task owns the sink, the session reads the stream
    let (sink, receiver) = socket.split();
    let (conn, rx) = Connection::channel();
    let writer = tokio::spawn(write_messages(sink, rx));
    let _writer_guard = AbortOnDrop::new(&writer);

    // Only text frames reach the session; a close frame or a read error ends it
    let inbound = receiver
        .take_while(|frame| future::ready(matches!(frame, Ok(msg) if !matches!(msg, Message::Close(_)))))
        .filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(text),
                _ => None,
            })
        })
        .boxed();

    let outcome = match Session::join(state.sync.clone(), &room_id, conn.clone()).await {
        Ok(session) => session::drive(session, inbound).await,
        Err(e) => Err(e),
    };

    let (code, reason) = match &outcome {
        Ok(()) => (CLOSE_NORMAL, Cow::Borrowed("")),
        Err(SessionError::RoomNotFound) => (SessionError::RoomNotFound.close_code(), Cow::Borrowed("Room not found")),
        Err(e) => (e.close_code(), Cow::Owned(e.to_string())),
    };

    // Once every handle is gone the writer drains what is queued and hands back the sink
    drop(conn);
    let Ok(written) = tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await else {
        warn!("Writer for room {} did not drain in time, dropping the socket", room_id);
        return;
    };
    match written {
        Ok(Some(mut sink)) => {
            let frame = CloseFrame { code, reason };
            match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, sink.send(Message::Close(Some(frame)))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Close frame for room {} not delivered: {}", room_id, e),
                Err(_) => debug!("Close frame for room {} timed out", room_id),
            }
        }
        Ok(None) => debug!("Socket for room {} was already gone", room_id),
        Err(e) => error!("Writer task for room {} failed: {}", room_id, e),
    }
    info!("WebSocket connection for room {} terminated with code {}", room_id, code);
}

/// Forwards queued messages to the socket. Returns the sink once the queue closes, or
/// `None` if the socket stopped accepting frames.
async fn write_messages(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: Receiver<ServerMessage>,
) -> Option<SplitSink<WebSocket, Message>> {
    while let Some(msg) = rx.recv().await {
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode {} message: {}", msg.kind(), e);
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            return None;
        }
    }
    Some(sink)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::routes::create_api_routes;
    use crate::state::AppState;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve() -> (String, Arc<AppState>) {
        let state = Arc::new(AppState::in_memory(Config::default()));
        let app = create_api_routes(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("ws://{}", addr), state)
    }

    async fn next_frame(client: &mut Client) -> Message {
        tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .expect("socket error")
    }

    /// Next JSON event whose type is not in `skip`.
    async fn next_event(client: &mut Client, skip: &[&str]) -> Value {
        loop {
            if let Message::Text(text) = next_frame(client).await {
                let event: Value = serde_json::from_str(text.as_str()).unwrap();
                if !skip.contains(&event["type"].as_str().unwrap_or_default()) {
                    return event;
                }
            }
        }
    }

    #[tokio::test]
    async fn unknown_room_is_closed_with_4004() {
        let (base, _state) = serve().await;
        let (mut client, _) = connect_async(format!("{}/ws/nope42", base)).await.unwrap();

        match next_frame(&mut client).await {
            Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4004),
            other => panic!("expected close frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn edits_reach_every_socket_in_the_room() {
        let (base, state) = serve().await;
        let room_id = state.rooms.create().await.unwrap();
        let url = format!("{}/ws/{}", base, room_id);

        let (mut alice, _) = connect_async(&url).await.unwrap();
        let init = next_event(&mut alice, &["user_joined"]).await;
        assert_eq!(init["type"], "init");
        assert_eq!(init["document"], "");
        let alice_id = init["your_user_id"].as_str().unwrap().to_string();

        let (mut bob, _) = connect_async(&url).await.unwrap();
        let init = next_event(&mut bob, &["user_joined"]).await;
        assert_eq!(init["type"], "init");
        assert!(init["users"].as_array().unwrap().contains(&json!(alice_id)));

        let edit = json!({"type": "code_update", "code": "fn main() {}"}).to_string();
        alice.send(Message::Text(edit.into())).await.unwrap();

        for client in [&mut bob, &mut alice] {
            let event = next_event(client, &["user_joined"]).await;
            assert_eq!(event["type"], "code_update");
            assert_eq!(event["code"], "fn main() {}");
            assert_eq!(event["user_id"], alice_id.as_str());
        }
        assert_eq!(state.sync.store.get_document(&room_id).await.unwrap(), "fn main() {}");
    }

    #[tokio::test]
    async fn closing_a_socket_announces_departure() {
        let (base, state) = serve().await;
        let room_id = state.rooms.create().await.unwrap();
        let url = format!("{}/ws/{}", base, room_id);

        let (mut alice, _) = connect_async(&url).await.unwrap();
        next_event(&mut alice, &["user_joined"]).await;
        let (mut bob, _) = connect_async(&url).await.unwrap();
        let bob_id = next_event(&mut bob, &["user_joined"]).await["your_user_id"]
            .as_str()
            .unwrap()
            .to_string();

        bob.close(None).await.unwrap();

        let event = next_event(&mut alice, &["user_joined"]).await;
        assert_eq!(event["type"], "user_left");
        assert_eq!(event["user_id"], bob_id.as_str());
        assert!(!state.sync.store.list_members(&room_id).await.unwrap().contains(&bob_id));
    }
}
