use serde::Deserialize;
use serde_json::Value;
use validator::Validate;
use voxroom_services::events::ChatMessageType;
use voxroom_services::media::room_manager::TransportKind;

/// Inbound wire frame. `ack` is the client-chosen id echoed back in the
/// acknowledgement; events without it are fire-and-forget.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(range(min = 1, max = 15))]
    pub seat_count: Option<u8>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransportCreatePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    pub kind: TransportKind,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TransportConnectPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub transport_id: String,
    /// Opaque DTLS blob; the SFU layer does the semantic validation.
    pub dtls_parameters: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProducePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub transport_id: String,
    pub kind: String,
    pub rtp_parameters: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub transport_id: String,
    #[validate(length(min = 1))]
    pub producer_id: String,
    pub rtp_capabilities: Value,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerResumePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub consumer_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SelfMutePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1))]
    pub producer_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeatIndexPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(range(max = 14))]
    pub seat_index: u8,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeatTargetPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(range(max = 14))]
    pub seat_index: u8,
    pub user_id: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeatUserPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    pub user_id: i64,
}

fn default_message_type() -> ChatMessageType {
    ChatMessageType::Text
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 500))]
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: ChatMessageType,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GiftSendPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    pub gift_id: i64,
    pub recipient_id: i64,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GiftPreparePayload {
    pub gift_id: i64,
    pub recipient_id: i64,
    #[validate(range(min = 1, max = 999))]
    pub quantity: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GetRoomPayload {
    pub user_id: i64,
}
