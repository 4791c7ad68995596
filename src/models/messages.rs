use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// Position and color of one member's cursor.
///
/// Stored whole: a cursor move replaces the previous state for that user.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq, Eq)]
pub struct CursorState {
    pub line: u32,
    pub column: u32,
    pub color: String,
}

fn default_line() -> u32 {
    1
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct CodeUpdateRequest {
    #[serde(default)]
    pub code: String,
}

/// Cursor move as sent by a client. Any `color` field in the payload is ignored.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct CursorMoveRequest {
    #[serde(default = "default_line")]
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "code_update")]
    CodeUpdate(CodeUpdateRequest),
    #[serde(rename = "cursor_move")]
    CursorMove(CursorMoveRequest),
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct InitMessage {
    pub document: String,
    pub users: Vec<String>,
    pub cursors: HashMap<String, CursorState>,
    pub your_user_id: String,
    pub your_color: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CodeUpdateMessage {
    pub code: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct CursorMoveMessage {
    pub user_id: String,
    pub line: u32,
    pub column: u32,
    pub color: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct UserJoinedMessage {
    pub user_id: String,
    pub color: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct UserLeftMessage {
    pub user_id: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub message: String,
}

/// Everything the server writes to a socket. Bus payloads are the JSON form of this enum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init(InitMessage),
    #[serde(rename = "code_update")]
    CodeUpdate(CodeUpdateMessage),
    #[serde(rename = "cursor_move")]
    CursorMove(CursorMoveMessage),
    #[serde(rename = "user_joined")]
    UserJoined(UserJoinedMessage),
    #[serde(rename = "user_left")]
    UserLeft(UserLeftMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Init(_) => "init",
            ServerMessage::CodeUpdate(_) => "code_update",
            ServerMessage::CursorMove(_) => "cursor_move",
            ServerMessage::UserJoined(_) => "user_joined",
            ServerMessage::UserLeft(_) => "user_left",
            ServerMessage::Error(_) => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage { message: message.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_move_ignores_client_color_and_defaults_position() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "cursor_move", "color": "#000000"})).unwrap();
        match msg {
            ClientMessage::CursorMove(req) => {
                assert_eq!(req.line, 1);
                assert_eq!(req.column, 0);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn unknown_client_tag_is_rejected() {
        let res = serde_json::from_str::<ClientMessage>(r#"{"type":"delete_room"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn negative_column_is_rejected() {
        let res = serde_json::from_str::<ClientMessage>(
            r#"{"type":"cursor_move","line":3,"column":-1}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn server_messages_are_tagged_with_type() {
        let value = serde_json::to_value(ServerMessage::UserLeft(UserLeftMessage {
            user_id: "abc".to_string(),
        }))
        .unwrap();
        assert_eq!(value, json!({"type": "user_left", "user_id": "abc"}));

        let init = ServerMessage::Init(InitMessage {
            document: "print(1)".to_string(),
            users: vec!["u1".to_string()],
            cursors: HashMap::new(),
            your_user_id: "u1".to_string(),
            your_color: "#C72626".to_string(),
        });
        let value = serde_json::to_value(&init).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["document"], "print(1)");
        assert_eq!(value["your_color"], "#C72626");
    }
}
