use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use voxroom_store::rooms::RoomStore;
use voxroom_store::seats::{SeatError, SeatInvite, SeatRepository};

use crate::backend::BackendError;
use crate::events::ServerEvent;
use crate::media::room_manager::{MediaError, RoomRegistry};
use crate::metrics::SEAT_OPS_TOTAL;
use crate::roles::RoleCache;
use crate::sink::Broadcaster;

#[derive(Debug, Error)]
pub enum SeatOpError {
    #[error("Not authorized")]
    NotAuthorized,
    #[error("Cannot invite yourself")]
    CannotInviteSelf,
    #[error("Target user is not seated")]
    UserNotSeated,
    #[error("Room not found")]
    RoomNotFound,
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Media(#[from] MediaError),
}

type OpResult<T> = Result<T, SeatOpError>;

/// Seat operations layered over the atomic repository: gates, broadcasts,
/// and the producer-pause mirror. Broadcast payloads carry only `userId`;
/// identity resolution stays client-side.
pub struct SeatCoordinator {
    seats: Arc<SeatRepository>,
    room_store: RoomStore,
    registry: Arc<RoomRegistry>,
    roles: Arc<RoleCache>,
    broadcaster: Arc<Broadcaster>,
    invite_ttl_secs: u64,
}

impl SeatCoordinator {
    pub fn new(
        seats: Arc<SeatRepository>,
        room_store: RoomStore,
        registry: Arc<RoomRegistry>,
        roles: Arc<RoleCache>,
        broadcaster: Arc<Broadcaster>,
        invite_ttl_secs: u64,
    ) -> Self {
        Self {
            seats,
            room_store,
            registry,
            roles,
            broadcaster,
            invite_ttl_secs,
        }
    }

    async fn seat_count(&self, room_id: &str) -> OpResult<u8> {
        self.room_store
            .get(room_id)
            .await
            .map_err(SeatError::Store)?
            .map(|state| state.seat_count)
            .ok_or(SeatOpError::RoomNotFound)
    }

    async fn require_owner(&self, room_id: &str, user_id: i64) -> OpResult<()> {
        if self.roles.is_owner(room_id, user_id).await? {
            Ok(())
        } else {
            Err(SeatOpError::NotAuthorized)
        }
    }

    async fn require_privileged(&self, room_id: &str, user_id: i64) -> OpResult<()> {
        if self.roles.is_privileged(room_id, user_id).await? {
            Ok(())
        } else {
            Err(SeatOpError::NotAuthorized)
        }
    }

    async fn seated(&self, room_id: &str, seat_index: u8, user_id: i64, cleared: Option<u8>) {
        if let Some(prev) = cleared {
            self.broadcaster
                .room(room_id, &ServerEvent::SeatCleared { seat_index: prev }, None)
                .await;
        }
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::SeatUpdated {
                    seat_index,
                    user_id,
                    muted: false,
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
    }

    pub async fn take(&self, room_id: &str, user_id: i64, seat_index: u8) -> OpResult<u8> {
        let seat_count = self.seat_count(room_id).await?;
        let result = self
            .seats
            .take_seat(room_id, user_id, seat_index, seat_count)
            .await;
        record("take", result.is_ok());
        let taken = result?;
        self.seated(room_id, taken.seat_index, user_id, taken.cleared)
            .await;
        Ok(taken.seat_index)
    }

    pub async fn leave(&self, room_id: &str, user_id: i64) -> OpResult<u8> {
        let result = self.seats.leave_seat(room_id, user_id).await;
        record("leave", result.is_ok());
        let seat_index = result?;
        self.broadcaster
            .room(room_id, &ServerEvent::SeatCleared { seat_index }, None)
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(seat_index)
    }

    pub async fn assign(
        &self,
        room_id: &str,
        actor: i64,
        target_user_id: i64,
        seat_index: u8,
    ) -> OpResult<u8> {
        self.require_owner(room_id, actor).await?;
        let seat_count = self.seat_count(room_id).await?;
        let result = self
            .seats
            .assign_seat(room_id, target_user_id, seat_index, seat_count)
            .await;
        record("assign", result.is_ok());
        let taken = result?;
        self.seated(room_id, taken.seat_index, target_user_id, taken.cleared)
            .await;
        Ok(taken.seat_index)
    }

    pub async fn remove(&self, room_id: &str, actor: i64, target_user_id: i64) -> OpResult<u8> {
        self.require_owner(room_id, actor).await?;
        let result = self.seats.remove_seat(room_id, target_user_id).await;
        record("remove", result.is_ok());
        let seat_index = match result {
            Err(SeatError::NotSeated) => return Err(SeatOpError::UserNotSeated),
            other => other?,
        };
        self.broadcaster
            .room(room_id, &ServerEvent::SeatCleared { seat_index }, None)
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(seat_index)
    }

    /// Mute/unmute share one path: flip the flag, mirror onto the occupant's
    /// producers, broadcast.
    pub async fn set_mute(
        &self,
        room_id: &str,
        actor: i64,
        seat_index: u8,
        muted: bool,
    ) -> OpResult<i64> {
        self.require_privileged(room_id, actor).await?;
        let result = self.seats.set_mute(room_id, seat_index, muted).await;
        record(if muted { "mute" } else { "unmute" }, result.is_ok());
        let occupant = result?.ok_or(SeatOpError::Seat(SeatError::NotSeated))?;

        self.registry
            .set_user_audio_paused(room_id, occupant, muted)
            .await?;
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::UserMuted {
                    user_id: occupant,
                    muted,
                    self_muted: false,
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
        debug!(room_id, seat_index, occupant, muted, "seat mute set");
        Ok(occupant)
    }

    pub async fn lock(&self, room_id: &str, actor: i64, seat_index: u8) -> OpResult<Option<i64>> {
        self.require_privileged(room_id, actor).await?;
        let result = self.seats.lock_seat(room_id, seat_index).await;
        record("lock", result.is_ok());
        let kicked = result?;

        if let Some(kicked_user_id) = kicked {
            self.registry
                .close_user_audio_producers(room_id, kicked_user_id);
            self.broadcaster
                .room(room_id, &ServerEvent::SeatCleared { seat_index }, None)
                .await;
        }
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::SeatLocked {
                    seat_index,
                    locked: true,
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(kicked)
    }

    pub async fn unlock(&self, room_id: &str, actor: i64, seat_index: u8) -> OpResult<()> {
        self.require_privileged(room_id, actor).await?;
        let result = self.seats.unlock_seat(room_id, seat_index).await;
        record("unlock", result.is_ok());
        result?;
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::SeatLocked {
                    seat_index,
                    locked: false,
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(())
    }

    pub async fn invite(
        &self,
        room_id: &str,
        actor: i64,
        seat_index: u8,
        target_user_id: i64,
    ) -> OpResult<SeatInvite> {
        self.require_privileged(room_id, actor).await?;
        if target_user_id == actor {
            return Err(SeatOpError::CannotInviteSelf);
        }
        let seat_count = self.seat_count(room_id).await?;
        if seat_index >= seat_count {
            return Err(SeatOpError::Seat(SeatError::Invalid));
        }

        let result = self
            .seats
            .create_invite(
                room_id,
                seat_index,
                target_user_id,
                actor,
                self.invite_ttl_secs,
            )
            .await;
        record("invite", result.is_ok());
        let invite = result?;

        self.broadcaster
            .user(
                target_user_id,
                &ServerEvent::InviteReceived {
                    seat_index,
                    invited_by_id: actor,
                    expires_at: invite.created_at + (self.invite_ttl_secs as i64) * 1000,
                    target_user_id,
                },
            )
            .await;
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::InvitePending {
                    seat_index,
                    pending: true,
                    invited_user_id: Some(target_user_id),
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(invite)
    }

    pub async fn accept_invite(&self, room_id: &str, user_id: i64) -> OpResult<u8> {
        let result = self.seats.accept_invite(room_id, user_id).await;
        record("invite:accept", result.is_ok());
        let accepted = result?;

        self.broadcaster
            .room(
                room_id,
                &ServerEvent::InvitePending {
                    seat_index: accepted.seat_index,
                    pending: false,
                    invited_user_id: Some(user_id),
                },
                None,
            )
            .await;
        if accepted.unlocked {
            self.broadcaster
                .room(
                    room_id,
                    &ServerEvent::SeatLocked {
                        seat_index: accepted.seat_index,
                        locked: false,
                    },
                    None,
                )
                .await;
        }
        self.seated(room_id, accepted.seat_index, user_id, accepted.cleared)
            .await;
        Ok(accepted.seat_index)
    }

    pub async fn decline_invite(&self, room_id: &str, user_id: i64) -> OpResult<u8> {
        let result = self.seats.decline_invite(room_id, user_id).await;
        record("invite:decline", result.is_ok());
        let seat_index = result?;
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::InvitePending {
                    seat_index,
                    pending: false,
                    invited_user_id: Some(user_id),
                },
                None,
            )
            .await;
        self.registry.touch_activity(room_id).await;
        Ok(seat_index)
    }
}

fn record(op: &str, ok: bool) {
    SEAT_OPS_TOTAL
        .with_label_values(&[op, if ok { "ok" } else { "err" }])
        .inc();
}
