use async_trait::async_trait;
use redis::aio::ConnectionManager;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::events::{RelayEnvelope, ServerEvent};

/// Delivery plane for this node's connections. Implemented by the api crate
/// over its connection registry; services only see the trait.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn to_connection(&self, conn_id: &str, frame: &Value);
    async fn to_user(&self, user_id: i64, frame: &Value);
    async fn to_user_in_room(&self, user_id: i64, room_id: &str, frame: &Value);
    async fn to_room(&self, room_id: &str, frame: &Value, exclude_conn: Option<&str>);
    async fn to_all(&self, frame: &Value);
}

/// Publishes envelopes on the shared channel so peer nodes can fan out to
/// their own connections.
#[derive(Clone)]
pub struct RelayPublisher {
    conn: ConnectionManager,
    channel: String,
    node_id: String,
}

impl RelayPublisher {
    pub fn new(conn: ConnectionManager, channel: String, node_id: String) -> Self {
        Self {
            conn,
            channel,
            node_id,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn publish(&self, envelope: &RelayEnvelope) {
        let Ok(body) = serde_json::to_string(envelope) else {
            return;
        };
        let mut conn = self.conn.clone();
        if let Err(e) = redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(body)
            .query_async::<()>(&mut conn)
            .await
        {
            warn!(%e, event = %envelope.event, "Failed to publish fan-out envelope");
        }
    }

    fn envelope(
        &self,
        event: &ServerEvent,
        user_id: Option<i64>,
        room_id: Option<&str>,
        conn_id: Option<&str>,
    ) -> RelayEnvelope {
        RelayEnvelope {
            event: event.name().to_string(),
            user_id,
            room_id: room_id.map(str::to_string),
            conn_id: conn_id.map(str::to_string),
            payload: event.data(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            correlation_id: None,
            origin: Some(self.node_id.clone()),
        }
    }
}

/// Local fan-out plus cross-node publication. The sender-exclusion only
/// applies locally; a sender's connection always lives on the origin node.
pub struct Broadcaster {
    local: Arc<dyn EventSink>,
    publisher: RelayPublisher,
}

impl Broadcaster {
    pub fn new(local: Arc<dyn EventSink>, publisher: RelayPublisher) -> Self {
        Self { local, publisher }
    }

    pub fn node_id(&self) -> &str {
        self.publisher.node_id()
    }

    /// Delivery to one specific connection. The connection lives on exactly
    /// one node, which may not be this one (a gift flushed by a peer).
    pub async fn connection(&self, conn_id: &str, event: &ServerEvent) {
        self.local.to_connection(conn_id, &event.frame()).await;
        self.publisher
            .publish(&self.publisher.envelope(event, None, None, Some(conn_id)))
            .await;
    }

    pub async fn user(&self, user_id: i64, event: &ServerEvent) {
        self.local.to_user(user_id, &event.frame()).await;
        self.publisher
            .publish(&self.publisher.envelope(event, Some(user_id), None, None))
            .await;
    }

    pub async fn room(&self, room_id: &str, event: &ServerEvent, exclude_conn: Option<&str>) {
        self.local
            .to_room(room_id, &event.frame(), exclude_conn)
            .await;
        self.publisher
            .publish(&self.publisher.envelope(event, None, Some(room_id), None))
            .await;
    }

    pub async fn all(&self, event: &ServerEvent) {
        self.local.to_all(&event.frame()).await;
        self.publisher
            .publish(&self.publisher.envelope(event, None, None, None))
            .await;
    }
}
