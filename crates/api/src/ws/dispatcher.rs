use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::{debug, warn};
use voxroom_services::events::ServerEvent;

use super::envelope;
use super::handler::ConnContext;
use super::handlers;
use super::protocol::*;
use crate::state::AppState;

/// Static dispatch table: every inbound event name maps to its handler at
/// startup; unknown names are acknowledged as invalid.
pub async fn dispatch(state: &AppState, ctx: &ConnContext, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(conn_id = %ctx.conn_id, %e, "Unparseable WS frame dropped");
            return;
        }
    };
    let ClientFrame { event, data, ack } = frame;

    match event.as_str() {
        "ping" => {
            if let Err(e) = state.indexes.touch_sockets(ctx.identity.user_id).await {
                warn!(user_id = ctx.identity.user_id, %e, "Heartbeat refresh failed");
            }
            let pong = ServerEvent::Pong {}.frame();
            let mut guard = ctx.sender.lock().await;
            let _ = guard.send(Message::text(pong.to_string())).await;
        }

        "room:join" => {
            envelope::handle::<JoinRoomPayload, _, _>("room:join", data, ack, &ctx.sender, |p| {
                handlers::room::join(state, ctx, p)
            })
            .await;
        }
        // Legacy fire-and-forget: the ack callback is ignored even when the
        // client asks for one.
        "room:leave" => {
            envelope::handle::<RoomPayload, _, _>("room:leave", data, None, &ctx.sender, |p| {
                handlers::room::leave(state, ctx, p)
            })
            .await;
        }
        "user:getRoom" => {
            envelope::handle::<GetRoomPayload, _, _>("user:getRoom", data, ack, &ctx.sender, |p| {
                handlers::room::get_room(state, ctx, p)
            })
            .await;
        }

        "transport:create" => {
            envelope::handle::<TransportCreatePayload, _, _>(
                "transport:create",
                data,
                ack,
                &ctx.sender,
                |p| handlers::media::transport_create(state, ctx, p),
            )
            .await;
        }
        "transport:connect" => {
            envelope::handle::<TransportConnectPayload, _, _>(
                "transport:connect",
                data,
                ack,
                &ctx.sender,
                |p| handlers::media::transport_connect(state, ctx, p),
            )
            .await;
        }
        "audio:produce" => {
            envelope::handle::<ProducePayload, _, _>("audio:produce", data, ack, &ctx.sender, |p| {
                handlers::media::produce(state, ctx, p)
            })
            .await;
        }
        "audio:consume" => {
            envelope::handle::<ConsumePayload, _, _>("audio:consume", data, ack, &ctx.sender, |p| {
                handlers::media::consume(state, ctx, p)
            })
            .await;
        }
        "consumer:resume" => {
            envelope::handle::<ConsumerResumePayload, _, _>(
                "consumer:resume",
                data,
                ack,
                &ctx.sender,
                |p| handlers::media::consumer_resume(state, ctx, p),
            )
            .await;
        }
        "audio:selfMute" => {
            envelope::handle::<SelfMutePayload, _, _>(
                "audio:selfMute",
                data,
                ack,
                &ctx.sender,
                |p| handlers::media::self_mute(state, ctx, p, true),
            )
            .await;
        }
        "audio:selfUnmute" => {
            envelope::handle::<SelfMutePayload, _, _>(
                "audio:selfUnmute",
                data,
                ack,
                &ctx.sender,
                |p| handlers::media::self_mute(state, ctx, p, false),
            )
            .await;
        }

        "seat:take" => {
            envelope::handle::<SeatIndexPayload, _, _>("seat:take", data, ack, &ctx.sender, |p| {
                handlers::seat::take(state, ctx, p)
            })
            .await;
        }
        "seat:leave" => {
            envelope::handle::<RoomPayload, _, _>("seat:leave", data, ack, &ctx.sender, |p| {
                handlers::seat::leave(state, ctx, p)
            })
            .await;
        }
        "seat:assign" => {
            envelope::handle::<SeatTargetPayload, _, _>("seat:assign", data, ack, &ctx.sender, |p| {
                handlers::seat::assign(state, ctx, p)
            })
            .await;
        }
        "seat:remove" => {
            envelope::handle::<SeatUserPayload, _, _>("seat:remove", data, ack, &ctx.sender, |p| {
                handlers::seat::remove(state, ctx, p)
            })
            .await;
        }
        "seat:mute" => {
            envelope::handle::<SeatIndexPayload, _, _>("seat:mute", data, ack, &ctx.sender, |p| {
                handlers::seat::set_mute(state, ctx, p, true)
            })
            .await;
        }
        "seat:unmute" => {
            envelope::handle::<SeatIndexPayload, _, _>("seat:unmute", data, ack, &ctx.sender, |p| {
                handlers::seat::set_mute(state, ctx, p, false)
            })
            .await;
        }
        "seat:lock" => {
            envelope::handle::<SeatIndexPayload, _, _>("seat:lock", data, ack, &ctx.sender, |p| {
                handlers::seat::lock(state, ctx, p)
            })
            .await;
        }
        "seat:unlock" => {
            envelope::handle::<SeatIndexPayload, _, _>("seat:unlock", data, ack, &ctx.sender, |p| {
                handlers::seat::unlock(state, ctx, p)
            })
            .await;
        }
        "seat:invite" => {
            envelope::handle::<SeatTargetPayload, _, _>("seat:invite", data, ack, &ctx.sender, |p| {
                handlers::seat::invite(state, ctx, p)
            })
            .await;
        }
        "seat:invite:accept" => {
            envelope::handle::<RoomPayload, _, _>(
                "seat:invite:accept",
                data,
                ack,
                &ctx.sender,
                |p| handlers::seat::accept_invite(state, ctx, p),
            )
            .await;
        }
        "seat:invite:decline" => {
            envelope::handle::<RoomPayload, _, _>(
                "seat:invite:decline",
                data,
                ack,
                &ctx.sender,
                |p| handlers::seat::decline_invite(state, ctx, p),
            )
            .await;
        }

        "chat:message" => {
            envelope::handle::<ChatPayload, _, _>("chat:message", data, ack, &ctx.sender, |p| {
                handlers::chat::message(state, ctx, p)
            })
            .await;
        }

        "gift:send" => {
            envelope::handle::<GiftSendPayload, _, _>("gift:send", data, ack, &ctx.sender, |p| {
                handlers::gift::send(state, ctx, p)
            })
            .await;
        }
        "gift:prepare" => {
            envelope::handle::<GiftPreparePayload, _, _>(
                "gift:prepare",
                data,
                ack,
                &ctx.sender,
                |p| handlers::gift::prepare(state, ctx, p),
            )
            .await;
        }

        other => {
            debug!(conn_id = %ctx.conn_id, event = other, "Unknown WS event");
            if let Some(ack_id) = ack {
                let frame = serde_json::json!({
                    "ack": ack_id, "ok": false, "err": "INVALID_PAYLOAD",
                });
                let mut guard = ctx.sender.lock().await;
                let _ = guard.send(Message::text(frame.to_string())).await;
            }
        }
    }
}
