use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Process diagnostics
#[utoipa::path(
    get,
    path = "/diagnostics",
    responses(
        (status = 200, description = "Connections, rooms and subscriptions served by this process", body = DiagnosticsResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

/// Create a new room
#[utoipa::path(
    post,
    path = "/rooms",
    responses(
        (status = 201, description = "Room created", body = RoomCreateResponse),
        (status = 503, description = "No free room id or the room store is unreachable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn create_room_doc() {}

/// Check whether a room exists
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/exists",
    params(
        ("room_id" = String, Path, description = "Room id")
    ),
    responses(
        (status = 200, description = "Existence of the room", body = RoomExistsResponse),
        (status = 503, description = "The room store is unreachable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn room_exists_doc() {}

/// Join a room over WebSocket
#[utoipa::path(
    get,
    path = "/ws/{room_id}",
    params(
        ("room_id" = String, Path, description = "Room id")
    ),
    responses(
        (status = 101, description = "Switching to the room sync protocol. Unknown rooms are closed with code 4004")
    )
)]
#[allow(dead_code)]
pub async fn websocket_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        diagnostics_doc,
        create_room_doc,
        room_exists_doc,
        websocket_doc,
    ),
    components(
        schemas(
            HealthResponse,
            DiagnosticsResponse,
            RoomCreateResponse,
            RoomExistsResponse,
            ErrorResponse,
            CursorState,
            CodeUpdateRequest,
            CursorMoveRequest,
            InitMessage,
            CodeUpdateMessage,
            CursorMoveMessage,
            UserJoinedMessage,
            UserLeftMessage,
            ErrorMessage,
        )
    ),
    tags(
        (name = "rooms", description = "Room lifecycle and real-time sync")
    )
)]
pub struct ApiDoc;
