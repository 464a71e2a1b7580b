use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::SinkExt;
use futures::stream::SplitSink;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use voxroom_services::Identity;
use voxroom_services::sink::EventSink;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

struct ConnectionEntry {
    sender: WsSender,
    identity: Identity,
}

/// Tracks every open connection on this node, who owns it, and which rooms
/// it has joined. This is the transport-layer "room": broadcasts resolve
/// membership here.
#[derive(Default)]
pub struct ConnectionRegistry {
    conns: DashMap<String, ConnectionEntry>,
    users: DashMap<i64, Vec<String>>,
    rooms: DashMap<String, HashSet<String>>,
    conn_rooms: DashMap<String, HashSet<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, conn_id: &str, identity: Identity, sender: WsSender) {
        self.users
            .entry(identity.user_id)
            .or_default()
            .push(conn_id.to_string());
        self.conns
            .insert(conn_id.to_string(), ConnectionEntry { sender, identity });
    }

    /// Removes a connection, returning the rooms it was still joined to so
    /// the caller can run leave cleanup.
    pub fn remove(&self, conn_id: &str) -> Vec<String> {
        let rooms: Vec<String> = self
            .conn_rooms
            .remove(conn_id)
            .map(|(_, set)| set.into_iter().collect())
            .unwrap_or_default();
        for room_id in &rooms {
            if let Some(mut members) = self.rooms.get_mut(room_id) {
                members.remove(conn_id);
            }
        }

        if let Some((_, entry)) = self.conns.remove(conn_id) {
            let user_id = entry.identity.user_id;
            if let Some(mut conn_ids) = self.users.get_mut(&user_id) {
                conn_ids.retain(|c| c != conn_id);
                if conn_ids.is_empty() {
                    drop(conn_ids);
                    self.users.remove(&user_id);
                }
            }
        }
        rooms
    }

    pub fn identity(&self, conn_id: &str) -> Option<Identity> {
        self.conns.get(conn_id).map(|e| e.identity.clone())
    }

    pub fn join_room(&self, conn_id: &str, room_id: &str) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id.to_string());
        self.conn_rooms
            .entry(conn_id.to_string())
            .or_default()
            .insert(room_id.to_string());
    }

    pub fn leave_room(&self, conn_id: &str, room_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(conn_id);
            if members.is_empty() {
                drop(members);
                self.rooms.remove(room_id);
            }
        }
        if let Some(mut rooms) = self.conn_rooms.get_mut(conn_id) {
            rooms.remove(room_id);
        }
    }

    /// O(1) membership check backing the NOT_IN_ROOM gates.
    pub fn is_member(&self, conn_id: &str, room_id: &str) -> bool {
        self.conn_rooms
            .get(conn_id)
            .map(|rooms| rooms.contains(room_id))
            .unwrap_or(false)
    }

    pub fn members(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Participant identities of a room, one entry per user.
    pub fn identities_in_room(&self, room_id: &str) -> Vec<Identity> {
        let mut seen = HashSet::new();
        self.members(room_id)
            .iter()
            .filter_map(|conn_id| self.identity(conn_id))
            .filter(|identity| seen.insert(identity.user_id))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.conns.len()
    }

    async fn send(&self, conn_id: &str, text: &str) {
        let sender = match self.conns.get(conn_id) {
            Some(entry) => Arc::clone(&entry.sender),
            None => return,
        };
        let mut guard = sender.lock().await;
        if let Err(e) = guard.send(Message::text(text.to_string())).await {
            warn!(conn_id, %e, "Failed to send WS message");
        } else {
            debug!(conn_id, "WS message sent");
        }
    }
}

#[async_trait]
impl EventSink for ConnectionRegistry {
    async fn to_connection(&self, conn_id: &str, frame: &Value) {
        let text = frame.to_string();
        self.send(conn_id, &text).await;
    }

    async fn to_user(&self, user_id: i64, frame: &Value) {
        let conn_ids: Vec<String> = self
            .users
            .get(&user_id)
            .map(|c| c.clone())
            .unwrap_or_default();
        let text = frame.to_string();
        for conn_id in conn_ids {
            self.send(&conn_id, &text).await;
        }
    }

    async fn to_user_in_room(&self, user_id: i64, room_id: &str, frame: &Value) {
        let conn_ids: Vec<String> = self
            .users
            .get(&user_id)
            .map(|c| c.clone())
            .unwrap_or_default();
        let text = frame.to_string();
        for conn_id in conn_ids {
            if self.is_member(&conn_id, room_id) {
                self.send(&conn_id, &text).await;
            }
        }
    }

    async fn to_room(&self, room_id: &str, frame: &Value, exclude_conn: Option<&str>) {
        let text = frame.to_string();
        for conn_id in self.members(room_id) {
            if exclude_conn == Some(conn_id.as_str()) {
                continue;
            }
            self.send(&conn_id, &text).await;
        }
    }

    async fn to_all(&self, frame: &Value) {
        let conn_ids: Vec<String> = self.conns.iter().map(|e| e.key().clone()).collect();
        let text = frame.to_string();
        for conn_id in conn_ids {
            self.send(&conn_id, &text).await;
        }
    }
}
