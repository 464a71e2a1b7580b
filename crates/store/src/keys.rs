//! Key layout for the shared store.
//!
//! Every key the service touches is built here so the scheme stays auditable
//! in one place.

pub fn room_state(room_id: &str) -> String {
    format!("room:state:{room_id}")
}

pub fn room_activity(room_id: &str) -> String {
    format!("room:{room_id}:activity")
}

pub fn room_seats(room_id: &str) -> String {
    format!("room:{room_id}:seats")
}

pub fn room_locked_seats(room_id: &str) -> String {
    format!("room:{room_id}:locked_seats")
}

pub fn seat_invite(room_id: &str, seat_index: u8) -> String {
    format!("room:{room_id}:invite:{seat_index}")
}

pub fn seat_invite_user(room_id: &str, user_id: i64) -> String {
    format!("room:{room_id}:invite:user:{user_id}")
}

pub fn seat_invite_pattern(room_id: &str) -> String {
    format!("room:{room_id}:invite:*")
}

pub fn user_sockets(user_id: i64) -> String {
    format!("user:{user_id}:sockets")
}

pub fn user_room(user_id: i64) -> String {
    format!("user:{user_id}:room")
}

pub fn rate_limit(action: &str, user_id: i64, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => format!("ratelimit:{action}:{user_id}:{scope}"),
        None => format!("ratelimit:{action}:{user_id}"),
    }
}

pub fn revoked(token_hash: &str) -> String {
    format!("auth:revoked:{token_hash}")
}

pub const GIFTS_PENDING: &str = "gifts:pending";
pub const GIFTS_DEAD_LETTER: &str = "gifts:dead_letter";

pub fn gifts_processing(ts_millis: i64) -> String {
    format!("gifts:pending:processing:{ts_millis}")
}

pub const ROOM_STATE_SCAN_PATTERN: &str = "room:state:*";

/// Extracts the room id back out of a `room:state:{id}` key.
pub fn room_id_from_state_key(key: &str) -> Option<&str> {
    key.strip_prefix("room:state:")
}
