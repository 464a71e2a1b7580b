use serde_json::{Value, json};

use super::require_member;
use crate::error::ErrorCode;
use crate::state::AppState;
use crate::ws::handler::ConnContext;
use crate::ws::protocol::{RoomPayload, SeatIndexPayload, SeatTargetPayload, SeatUserPayload};

pub async fn take(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatIndexPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .take(&p.room_id, ctx.identity.user_id, p.seat_index)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}

pub async fn leave(
    state: &AppState,
    ctx: &ConnContext,
    p: RoomPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .leave(&p.room_id, ctx.identity.user_id)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}

pub async fn assign(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatTargetPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .assign(&p.room_id, ctx.identity.user_id, p.user_id, p.seat_index)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}

pub async fn remove(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatUserPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .remove(&p.room_id, ctx.identity.user_id, p.user_id)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}

pub async fn set_mute(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatIndexPayload,
    muted: bool,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let user_id = state
        .seat_ops
        .set_mute(&p.room_id, ctx.identity.user_id, p.seat_index, muted)
        .await?;
    Ok(json!({ "seatIndex": p.seat_index, "userId": user_id, "muted": muted }))
}

pub async fn lock(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatIndexPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let kicked_user_id = state
        .seat_ops
        .lock(&p.room_id, ctx.identity.user_id, p.seat_index)
        .await?;
    Ok(json!({ "seatIndex": p.seat_index, "kickedUserId": kicked_user_id }))
}

pub async fn unlock(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatIndexPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    state
        .seat_ops
        .unlock(&p.room_id, ctx.identity.user_id, p.seat_index)
        .await?;
    Ok(json!({ "seatIndex": p.seat_index }))
}

pub async fn invite(
    state: &AppState,
    ctx: &ConnContext,
    p: SeatTargetPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let invite = state
        .seat_ops
        .invite(&p.room_id, ctx.identity.user_id, p.seat_index, p.user_id)
        .await?;
    Ok(json!({
        "seatIndex": invite.seat_index,
        "targetUserId": invite.target_user_id,
    }))
}

pub async fn accept_invite(
    state: &AppState,
    ctx: &ConnContext,
    p: RoomPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .accept_invite(&p.room_id, ctx.identity.user_id)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}

pub async fn decline_invite(
    state: &AppState,
    ctx: &ConnContext,
    p: RoomPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let seat_index = state
        .seat_ops
        .decline_invite(&p.room_id, ctx.identity.user_id)
        .await?;
    Ok(json!({ "seatIndex": seat_index }))
}
