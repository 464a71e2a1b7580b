pub mod chat;
pub mod gift;
pub mod media;
pub mod room;
pub mod seat;

use crate::error::ErrorCode;
use crate::state::AppState;

use super::handler::ConnContext;

/// NOT_IN_ROOM gate shared by every room-scoped handler.
pub fn require_member(state: &AppState, ctx: &ConnContext, room_id: &str) -> Result<(), ErrorCode> {
    if state.connections.is_member(&ctx.conn_id, room_id) {
        Ok(())
    } else {
        Err(ErrorCode::NotInRoom)
    }
}
