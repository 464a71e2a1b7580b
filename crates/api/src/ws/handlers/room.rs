use serde_json::{Value, json};
use tracing::warn;
use voxroom_services::events::ServerEvent;
use voxroom_services::metrics::ROOM_PARTICIPANTS;

use crate::error::ErrorCode;
use crate::state::AppState;
use crate::ws::handler::ConnContext;
use crate::ws::protocol::{GetRoomPayload, JoinRoomPayload, RoomPayload};

const DEFAULT_SEAT_COUNT: u8 = 15;

/// `room:join`: attach to the room (creating it on demand) and return the
/// full snapshot a client needs to render it.
pub async fn join(
    state: &AppState,
    ctx: &ConnContext,
    p: JoinRoomPayload,
) -> Result<Value, ErrorCode> {
    let user_id = ctx.identity.user_id;
    let seat_count = p.seat_count.unwrap_or(DEFAULT_SEAT_COUNT);

    let outcome = state.rooms.join_room(&p.room_id, user_id, seat_count).await?;

    state.connections.join_room(&ctx.conn_id, &p.room_id);
    ROOM_PARTICIPANTS.inc();

    state
        .broadcaster
        .room(
            &p.room_id,
            &ServerEvent::UserJoined {
                user_id,
                user: ctx.identity.clone(),
            },
            Some(&ctx.conn_id),
        )
        .await;

    let (seats, locked_seats) = state.seats.snapshot(&p.room_id).await.map_err(ErrorCode::from)?;
    let pending_invites = state
        .seats
        .pending_invite_seats(&p.room_id)
        .await
        .map_err(ErrorCode::from)?;
    let active_producers = state.rooms.producers_snapshot(&p.room_id, &ctx.conn_id);
    let participants = state.connections.identities_in_room(&p.room_id);

    let seats: Vec<Value> = seats
        .into_iter()
        .map(|(seat_index, seat)| {
            json!({
                "seatIndex": seat_index,
                "userId": seat.user_id,
                "muted": seat.muted,
            })
        })
        .collect();

    Ok(json!({
        "roomId": p.room_id,
        "rtpCapabilities": outcome.rtp_capabilities,
        "participants": participants,
        "seats": seats,
        "lockedSeats": locked_seats,
        "pendingInvites": pending_invites,
        "activeProducers": active_producers,
        "seatCount": outcome.state.seat_count,
        "ownerId": outcome.state.owner_id,
        "participantCount": outcome.participant_count,
    }))
}

/// `room:leave`: legacy fire-and-forget.
pub async fn leave(
    state: &AppState,
    ctx: &ConnContext,
    p: RoomPayload,
) -> Result<Value, ErrorCode> {
    if !state.connections.is_member(&ctx.conn_id, &p.room_id) {
        return Err(ErrorCode::NotInRoom);
    }
    state.connections.leave_room(&ctx.conn_id, &p.room_id);
    leave_cleanup(state, ctx, &p.room_id).await;
    Ok(Value::Null)
}

/// Shared by the leave handler and disconnect teardown. Membership must
/// already be removed so the departing connection is excluded from the
/// broadcasts below.
pub async fn leave_cleanup(state: &AppState, ctx: &ConnContext, room_id: &str) {
    let user_id = ctx.identity.user_id;
    match state.rooms.leave_room(room_id, user_id, &ctx.conn_id).await {
        Ok(Some(seat_index)) => {
            state
                .broadcaster
                .room(room_id, &ServerEvent::SeatCleared { seat_index }, None)
                .await;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(room_id, user_id, %e, "leave cleanup failed");
        }
    }
    state
        .broadcaster
        .room(room_id, &ServerEvent::UserLeft { user_id }, None)
        .await;
    ROOM_PARTICIPANTS.dec();
}

/// `user:getRoom`: where is this user, from the shared index.
pub async fn get_room(
    state: &AppState,
    ctx: &ConnContext,
    p: GetRoomPayload,
) -> Result<Value, ErrorCode> {
    let allowed = state
        .rate_limiter
        .allow(
            "query",
            ctx.identity.user_id,
            None,
            state.settings.rate_limits.query,
        )
        .await
        .map_err(ErrorCode::from)?;
    if !allowed {
        return Err(ErrorCode::RateLimited);
    }

    let room_id = state
        .indexes
        .get_room(p.user_id)
        .await
        .map_err(ErrorCode::from)?;
    Ok(json!({ "roomId": room_id }))
}
