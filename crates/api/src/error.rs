use serde::Serialize;
use voxroom_services::auth::AuthError;
use voxroom_services::media::room_manager::{MediaError, RegistryError};
use voxroom_services::seats::SeatOpError;
use voxroom_store::StoreError;
use voxroom_store::seats::SeatError;

/// Wire-level error codes carried in `{ok:false, err}` acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPayload,
    Internal,
    RateLimited,
    NotInRoom,
    NotAuthorized,
    RoomNotFound,
    SeatTaken,
    SeatLocked,
    SeatNotLocked,
    SeatAlreadyLocked,
    SeatInvalid,
    NotSeated,
    UserNotSeated,
    CannotInviteSelf,
    InvitePending,
    NoInvite,
    SeatOccupied,
    TransportLimit,
    TransportNotFound,
    ConsumerNotFound,
    ProducerNotFound,
    CannotConsume,
    CannotGiftSelf,
    AuthRequired,
    InvalidCredentials,
    AuthFailed,
    OriginNotAllowed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidPayload => "INVALID_PAYLOAD",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::NotInRoom => "NOT_IN_ROOM",
            ErrorCode::NotAuthorized => "NOT_AUTHORIZED",
            ErrorCode::RoomNotFound => "ROOM_NOT_FOUND",
            ErrorCode::SeatTaken => "SEAT_TAKEN",
            ErrorCode::SeatLocked => "SEAT_LOCKED",
            ErrorCode::SeatNotLocked => "SEAT_NOT_LOCKED",
            ErrorCode::SeatAlreadyLocked => "SEAT_ALREADY_LOCKED",
            ErrorCode::SeatInvalid => "SEAT_INVALID",
            ErrorCode::NotSeated => "NOT_SEATED",
            ErrorCode::UserNotSeated => "USER_NOT_SEATED",
            ErrorCode::CannotInviteSelf => "CANNOT_INVITE_SELF",
            ErrorCode::InvitePending => "INVITE_PENDING",
            ErrorCode::NoInvite => "NO_INVITE",
            ErrorCode::SeatOccupied => "SEAT_OCCUPIED",
            ErrorCode::TransportLimit => "TRANSPORT_LIMIT",
            ErrorCode::TransportNotFound => "TRANSPORT_NOT_FOUND",
            ErrorCode::ConsumerNotFound => "CONSUMER_NOT_FOUND",
            ErrorCode::ProducerNotFound => "PRODUCER_NOT_FOUND",
            ErrorCode::CannotConsume => "CANNOT_CONSUME",
            ErrorCode::CannotGiftSelf => "CANNOT_GIFT_SELF",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidCredentials => "INVALID_CREDENTIALS",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::OriginNotAllowed => "ORIGIN_NOT_ALLOWED",
        }
    }
}

impl From<SeatError> for ErrorCode {
    fn from(e: SeatError) -> Self {
        match e {
            SeatError::Invalid => ErrorCode::SeatInvalid,
            SeatError::Locked => ErrorCode::SeatLocked,
            SeatError::Taken => ErrorCode::SeatTaken,
            SeatError::Occupied => ErrorCode::SeatOccupied,
            SeatError::NotSeated => ErrorCode::NotSeated,
            SeatError::AlreadyLocked => ErrorCode::SeatAlreadyLocked,
            SeatError::NotLocked => ErrorCode::SeatNotLocked,
            SeatError::InvitePending => ErrorCode::InvitePending,
            SeatError::NoInvite => ErrorCode::NoInvite,
            SeatError::Store(_) => ErrorCode::Internal,
        }
    }
}

impl From<SeatOpError> for ErrorCode {
    fn from(e: SeatOpError) -> Self {
        match e {
            SeatOpError::NotAuthorized => ErrorCode::NotAuthorized,
            SeatOpError::CannotInviteSelf => ErrorCode::CannotInviteSelf,
            SeatOpError::UserNotSeated => ErrorCode::UserNotSeated,
            SeatOpError::RoomNotFound => ErrorCode::RoomNotFound,
            SeatOpError::Seat(e) => e.into(),
            SeatOpError::Backend(_) => ErrorCode::Internal,
            SeatOpError::Media(e) => e.into(),
        }
    }
}

impl From<MediaError> for ErrorCode {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::RoomNotFound => ErrorCode::RoomNotFound,
            MediaError::TransportLimit => ErrorCode::TransportLimit,
            MediaError::TransportNotFound => ErrorCode::TransportNotFound,
            MediaError::ProducerNotFound => ErrorCode::ProducerNotFound,
            MediaError::ConsumerNotFound => ErrorCode::ConsumerNotFound,
            MediaError::CannotConsume => ErrorCode::CannotConsume,
            MediaError::NotAuthorized => ErrorCode::NotAuthorized,
            MediaError::Sfu(_) => ErrorCode::Internal,
        }
    }
}

impl From<RegistryError> for ErrorCode {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::RoomNotFound => ErrorCode::RoomNotFound,
            RegistryError::Media(e) => e.into(),
            RegistryError::Seat(e) => e.into(),
            RegistryError::Store(_) | RegistryError::Backend(_) => ErrorCode::Internal,
        }
    }
}

impl From<StoreError> for ErrorCode {
    fn from(_: StoreError) -> Self {
        ErrorCode::Internal
    }
}

impl From<AuthError> for ErrorCode {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Required => ErrorCode::AuthRequired,
            AuthError::Invalid => ErrorCode::InvalidCredentials,
            AuthError::OriginNotAllowed => ErrorCode::OriginNotAllowed,
            AuthError::Failed => ErrorCode::AuthFailed,
        }
    }
}
