use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response returned after creating a room
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RoomCreateResponse {
    pub room_id: String,
    pub join_url: String,
    pub ws_url: String,
}

/// Response for a room existence check
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct RoomExistsResponse {
    pub exists: bool,
    pub room_id: String,
}
