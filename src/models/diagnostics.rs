use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Process-local view of live rooms
#[derive(Serialize, Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsResponse {
    pub n_conn: u32,
    pub n_rooms: u32,
    pub n_subscriptions: u32,
}
