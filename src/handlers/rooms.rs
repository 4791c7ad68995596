use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::models::{ErrorResponse, RoomCreateResponse, RoomExistsResponse};
use crate::services::RoomError;
use crate::state::AppState;

/// Create a new room with an empty document
pub async fn create_room(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<RoomCreateResponse>), (StatusCode, Json<ErrorResponse>)> {
    let room_id = match state.rooms.create().await {
        Ok(room_id) => room_id,
        Err(e @ RoomError::CreationExhausted { .. }) => {
            error!("Room creation exhausted: {}", e);
            return Err(ErrorResponse::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to create room: {}", e),
            ));
        }
        Err(RoomError::Store(e)) => {
            error!("Room store failed during creation: {}", e);
            return Err(ErrorResponse::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to create room: {}", e),
            ));
        }
    };

    info!("Room '{}' created", room_id);
    let config = &state.config;
    Ok((
        StatusCode::CREATED,
        Json(RoomCreateResponse {
            join_url: format!("{}/{}", config.base_url.trim_end_matches('/'), room_id),
            ws_url: format!("{}/ws/{}", config.ws_base_url(), room_id),
            room_id,
        }),
    ))
}

/// Check whether a room exists
pub async fn room_exists(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> Result<(StatusCode, Json<RoomExistsResponse>), (StatusCode, Json<ErrorResponse>)> {
    match state.rooms.exists(&room_id).await {
        Ok(exists) => Ok((StatusCode::OK, Json(RoomExistsResponse { exists, room_id }))),
        Err(e) => {
            error!("Failed to check room '{}': {}", room_id, e);
            Err(ErrorResponse::with_status(
                StatusCode::SERVICE_UNAVAILABLE,
                format!("Failed to check room '{}': {}", room_id, e),
            ))
        }
    }
}
