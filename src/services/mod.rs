pub mod room_service;

pub use room_service::{RoomError, RoomService};
