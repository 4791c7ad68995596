use crate::{models::DiagnosticsResponse, state::AppState};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

/// Report what this process currently serves
pub async fn diagnostics(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let sync = &state.sync;
    let n_conn = sync.registry.connection_count().await as u32;
    let n_rooms = sync.registry.room_count().await as u32;
    let n_subscriptions = sync.bridge.subscription_count().await as u32;

    info!(
        "Diagnostics: Conn: {}, Rooms: {}, Subscriptions: {}",
        n_conn, n_rooms, n_subscriptions
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_rooms,
            n_subscriptions,
        }),
    )
}
