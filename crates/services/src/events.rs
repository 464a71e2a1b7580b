use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::Identity;

/// Server -> client events. Serialized as `{event, data}` frames; relay
/// pass-through events are built by the relay from the same frame shape.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "room:userJoined", rename_all = "camelCase")]
    UserJoined { user_id: i64, user: Identity },

    #[serde(rename = "room:userLeft", rename_all = "camelCase")]
    UserLeft { user_id: i64 },

    #[serde(rename = "room:closed", rename_all = "camelCase")]
    RoomClosed {
        room_id: String,
        reason: String,
        ts: i64,
    },

    /// A new producer appeared; room-scoped, excluding the producing sender.
    #[serde(rename = "audio:newProducer", rename_all = "camelCase")]
    NewProducer {
        producer_id: String,
        user_id: i64,
        kind: String,
    },

    /// Change-gated: emitted only when the dominant-speaker set changes.
    #[serde(rename = "speaker:active", rename_all = "camelCase")]
    ActiveSpeakers { active_speakers: Vec<i64>, ts: i64 },

    #[serde(rename = "seat:updated", rename_all = "camelCase")]
    SeatUpdated {
        seat_index: u8,
        user_id: i64,
        muted: bool,
    },

    #[serde(rename = "seat:cleared", rename_all = "camelCase")]
    SeatCleared { seat_index: u8 },

    #[serde(rename = "seat:locked", rename_all = "camelCase")]
    SeatLocked { seat_index: u8, locked: bool },

    #[serde(rename = "seat:userMuted", rename_all = "camelCase")]
    UserMuted {
        user_id: i64,
        muted: bool,
        self_muted: bool,
    },

    /// Targeted at the invited user only.
    #[serde(rename = "seat:invite:received", rename_all = "camelCase")]
    InviteReceived {
        seat_index: u8,
        invited_by_id: i64,
        expires_at: i64,
        target_user_id: i64,
    },

    #[serde(rename = "seat:invite:pending", rename_all = "camelCase")]
    InvitePending {
        seat_index: u8,
        pending: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        invited_user_id: Option<i64>,
    },

    #[serde(rename = "chat:message")]
    Chat(ChatMessage),

    #[serde(rename = "gift:received", rename_all = "camelCase")]
    GiftReceived {
        sender_id: i64,
        room_id: String,
        gift_id: i64,
        recipient_id: i64,
        quantity: u32,
    },

    /// Targeted at the original sender's connection only.
    #[serde(rename = "gift:error", rename_all = "camelCase")]
    GiftError {
        transaction_id: Uuid,
        code: Value,
        reason: String,
    },

    /// Preload signal targeted at the recipient's connections.
    #[serde(rename = "gift:prepare", rename_all = "camelCase")]
    GiftPrepare {
        sender_id: i64,
        gift_id: i64,
        quantity: u32,
    },

    #[serde(rename = "pong")]
    Pong {},
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserJoined { .. } => "room:userJoined",
            ServerEvent::UserLeft { .. } => "room:userLeft",
            ServerEvent::RoomClosed { .. } => "room:closed",
            ServerEvent::NewProducer { .. } => "audio:newProducer",
            ServerEvent::ActiveSpeakers { .. } => "speaker:active",
            ServerEvent::SeatUpdated { .. } => "seat:updated",
            ServerEvent::SeatCleared { .. } => "seat:cleared",
            ServerEvent::SeatLocked { .. } => "seat:locked",
            ServerEvent::UserMuted { .. } => "seat:userMuted",
            ServerEvent::InviteReceived { .. } => "seat:invite:received",
            ServerEvent::InvitePending { .. } => "seat:invite:pending",
            ServerEvent::Chat(_) => "chat:message",
            ServerEvent::GiftReceived { .. } => "gift:received",
            ServerEvent::GiftError { .. } => "gift:error",
            ServerEvent::GiftPrepare { .. } => "gift:prepare",
            ServerEvent::Pong {} => "pong",
        }
    }

    /// The `{event, data}` wire frame.
    pub fn frame(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }

    /// The `data` part alone, used when wrapping into a relay envelope.
    pub fn data(&self) -> Value {
        self.frame().get("data").cloned().unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMessageType {
    Text,
    Emoji,
    Sticker,
    Gift,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: i64,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: ChatMessageType,
    pub ts: i64,
}

/// Envelope carried on the shared pub/sub channel, both for backend-origin
/// domain events and for cross-node fan-out of our own broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayEnvelope {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Narrowest target: one specific connection, wherever it lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conn_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Node that published this envelope; absent for backend-origin events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl RelayEnvelope {
    pub fn frame(&self) -> Value {
        serde_json::json!({ "event": self.event, "data": self.payload })
    }
}
