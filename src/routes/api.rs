use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{create_room, diagnostics, health_check, room_exists};
use crate::state::AppState;
use crate::ws::handler::websocket_handler;

/// Create API routes
pub fn create_api_routes(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/diagnostics", get(diagnostics))
        .route("/rooms", post(create_room))
        .route("/rooms/:room_id/exists", get(room_exists))
        .route("/ws/:room_id", get(websocket_handler))
        .with_state(state)
}
