use nanoid::nanoid;
use serde_json::{Value, json};
use voxroom_services::events::{ChatMessage, ServerEvent};

use super::require_member;
use crate::error::ErrorCode;
use crate::state::AppState;
use crate::ws::handler::ConnContext;
use crate::ws::protocol::ChatPayload;

/// `chat:message`: room-wide broadcast including the sender. Names and
/// avatars ride along here (unlike seat events) because chat is rendered
/// from the message alone.
pub async fn message(
    state: &AppState,
    ctx: &ConnContext,
    p: ChatPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;

    let user_id = ctx.identity.user_id;
    let allowed = state
        .rate_limiter
        .allow(
            "chat",
            user_id,
            Some(&p.room_id),
            state.settings.rate_limits.chat,
        )
        .await
        .map_err(ErrorCode::from)?;
    if !allowed {
        return Err(ErrorCode::RateLimited);
    }

    let message = ChatMessage {
        id: nanoid!(16),
        user_id,
        user_name: ctx.identity.display_name.clone(),
        avatar: ctx.identity.avatar.clone(),
        content: p.content,
        message_type: p.message_type,
        ts: chrono::Utc::now().timestamp_millis(),
    };

    state
        .broadcaster
        .room(&p.room_id, &ServerEvent::Chat(message.clone()), None)
        .await;
    state.rooms.touch_activity(&p.room_id).await;

    Ok(json!({ "id": message.id, "ts": message.ts }))
}
