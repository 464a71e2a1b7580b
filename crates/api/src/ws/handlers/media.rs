use mediasoup::prelude::{DtlsParameters, RtpCapabilities, RtpParameters};
use serde_json::{Value, json};
use voxroom_services::events::ServerEvent;

use super::require_member;
use crate::error::ErrorCode;
use crate::state::AppState;
use crate::ws::handler::ConnContext;
use crate::ws::protocol::{
    ConsumePayload, ConsumerResumePayload, ProducePayload, SelfMutePayload,
    TransportConnectPayload, TransportCreatePayload,
};

/// `transport:create`: at most one producer-side and one consumer-side
/// transport per connection.
pub async fn transport_create(
    state: &AppState,
    ctx: &ConnContext,
    p: TransportCreatePayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let options = state
        .rooms
        .create_transport(&p.room_id, &ctx.conn_id, ctx.identity.user_id, p.kind)
        .await?;
    Ok(serde_json::to_value(options).unwrap_or_default())
}

pub async fn transport_connect(
    state: &AppState,
    ctx: &ConnContext,
    p: TransportConnectPayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let dtls_parameters: DtlsParameters =
        serde_json::from_value(p.dtls_parameters).map_err(|_| ErrorCode::InvalidPayload)?;
    state
        .rooms
        .connect_transport(&p.room_id, &ctx.conn_id, &p.transport_id, dtls_parameters)
        .await?;
    Ok(Value::Null)
}

/// `audio:produce`: audio only; announces the producer to the rest of the
/// room (the producing sender already knows).
pub async fn produce(
    state: &AppState,
    ctx: &ConnContext,
    p: ProducePayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    if p.kind != "audio" {
        return Err(ErrorCode::InvalidPayload);
    }
    let rtp_parameters: RtpParameters =
        serde_json::from_value(p.rtp_parameters).map_err(|_| ErrorCode::InvalidPayload)?;

    let producer_id = state
        .rooms
        .produce(
            &p.room_id,
            &ctx.conn_id,
            ctx.identity.user_id,
            &p.transport_id,
            rtp_parameters,
        )
        .await?;

    state
        .broadcaster
        .room(
            &p.room_id,
            &ServerEvent::NewProducer {
                producer_id: producer_id.clone(),
                user_id: ctx.identity.user_id,
                kind: "audio".to_string(),
            },
            Some(&ctx.conn_id),
        )
        .await;
    state.rooms.touch_activity(&p.room_id).await;

    Ok(json!({ "id": producer_id }))
}

/// `audio:consume`: consumers start paused until `consumer:resume`.
pub async fn consume(
    state: &AppState,
    ctx: &ConnContext,
    p: ConsumePayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    let rtp_capabilities: RtpCapabilities =
        serde_json::from_value(p.rtp_capabilities).map_err(|_| ErrorCode::InvalidPayload)?;

    let info = state
        .rooms
        .consume(
            &p.room_id,
            &ctx.conn_id,
            ctx.identity.user_id,
            &p.transport_id,
            &p.producer_id,
            rtp_capabilities,
        )
        .await?;
    Ok(serde_json::to_value(info).unwrap_or_default())
}

pub async fn consumer_resume(
    state: &AppState,
    ctx: &ConnContext,
    p: ConsumerResumePayload,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    state
        .rooms
        .resume_consumer(&p.room_id, &ctx.conn_id, &p.consumer_id)
        .await?;
    Ok(Value::Null)
}

/// `audio:selfMute` / `audio:selfUnmute`: only the producer's owner may
/// toggle it.
pub async fn self_mute(
    state: &AppState,
    ctx: &ConnContext,
    p: SelfMutePayload,
    muted: bool,
) -> Result<Value, ErrorCode> {
    require_member(state, ctx, &p.room_id)?;
    state
        .rooms
        .set_own_producer_paused(
            &p.room_id,
            &ctx.conn_id,
            ctx.identity.user_id,
            &p.producer_id,
            muted,
        )
        .await?;

    state
        .broadcaster
        .room(
            &p.room_id,
            &ServerEvent::UserMuted {
                user_id: ctx.identity.user_id,
                muted,
                self_muted: true,
            },
            None,
        )
        .await;
    Ok(Value::Null)
}
