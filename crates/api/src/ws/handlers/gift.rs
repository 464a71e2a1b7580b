use serde_json::{Value, json};
use uuid::Uuid;
use voxroom_services::events::ServerEvent;
use voxroom_store::gifts::GiftTransaction;

use super::require_member;
use crate::error::ErrorCode;
use crate::state::AppState;
use crate::ws::handler::ConnContext;
use crate::ws::protocol::{GiftPreparePayload, GiftSendPayload};

/// `gift:send`: broadcast immediately, settle asynchronously. The broadcast
/// carries ids only; clients resolve names from their participant map.
pub async fn send(
    state: &AppState,
    ctx: &ConnContext,
    p: GiftSendPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let sender_id = ctx.identity.user_id;
    if p.recipient_id == sender_id {
        return Err(ErrorCode::CannotGiftSelf);
    }

    let allowed = state
        .rate_limiter
        .allow("gift", sender_id, None, state.settings.rate_limits.gift)
        .await
        .map_err(ErrorCode::from)?;
    if !allowed {
        return Err(ErrorCode::RateLimited);
    }

    let tx = GiftTransaction {
        transaction_id: Uuid::new_v4(),
        sender_id,
        recipient_id: p.recipient_id,
        gift_id: p.gift_id,
        quantity: p.quantity,
        room_id: p.room_id.clone(),
        ts: chrono::Utc::now().timestamp_millis(),
        sender_conn_id: ctx.conn_id.clone(),
        retry_count: 0,
    };

    state
        .broadcaster
        .room(
            &p.room_id,
            &ServerEvent::GiftReceived {
                sender_id,
                room_id: p.room_id.clone(),
                gift_id: p.gift_id,
                recipient_id: p.recipient_id,
                quantity: p.quantity,
            },
            None,
        )
        .await;

    state.gifts.enqueue(&tx).await.map_err(ErrorCode::from)?;
    state.rooms.touch_activity(&p.room_id).await;

    Ok(json!({ "transactionId": tx.transaction_id }))
}

/// `gift:prepare`: preload hint targeted at the recipient's connections,
/// wherever in the fleet they are.
pub async fn prepare(
    state: &AppState,
    ctx: &ConnContext,
    p: GiftPreparePayload,
) -> Result<Value, ErrorCode> {
    let sender_id = ctx.identity.user_id;
    let allowed = state
        .rate_limiter
        .allow(
            "gift:prepare",
            sender_id,
            None,
            state.settings.rate_limits.gift_prepare,
        )
        .await
        .map_err(ErrorCode::from)?;
    if !allowed {
        return Err(ErrorCode::RateLimited);
    }

    state
        .broadcaster
        .user(
            p.recipient_id,
            &ServerEvent::GiftPrepare {
                sender_id,
                gift_id: p.gift_id,
                quantity: p.quantity,
            },
        )
        .await;
    Ok(Value::Null)
}
