use redis::Script;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Created,
    Active,
    Closing,
    Closed,
}

/// Room record shared across the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub status: RoomStatus,
    pub owner_id: i64,
    pub seat_count: u8,
    pub participant_count: u32,
    pub created_at: i64,
    /// Node hosting the SFU router for this room.
    pub host_node: String,
}

// Idempotent create-or-get arbitrates the fleet-wide room singleton.
const CREATE_OR_GET: &str = r#"
local cur = redis.call('GET', KEYS[1])
if cur then
  return {'EXISTS', cur}
end
redis.call('SET', KEYS[1], ARGV[1])
return {'CREATED', ARGV[1]}
"#;

// participantCount changes happen inside the JSON value, so they go through
// a script rather than a client-side read-modify-write.
const ADD_PARTICIPANT: &str = r#"
local cur = redis.call('GET', KEYS[1])
if not cur then
  return -1
end
local state = cjson.decode(cur)
state.participantCount = math.max(0, state.participantCount + tonumber(ARGV[1]))
redis.call('SET', KEYS[1], cjson.encode(state))
return state.participantCount
"#;

/// Fleet-shared room records plus the activity keys driving auto-close.
#[derive(Clone)]
pub struct RoomStore {
    conn: ConnectionManager,
    create_or_get: std::sync::Arc<Script>,
    add_participant: std::sync::Arc<Script>,
}

impl RoomStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            create_or_get: std::sync::Arc::new(Script::new(CREATE_OR_GET)),
            add_participant: std::sync::Arc::new(Script::new(ADD_PARTICIPANT)),
        }
    }

    /// Creates the room record unless one exists; returns the authoritative
    /// record and whether this call created it.
    pub async fn create_or_get(
        &self,
        room_id: &str,
        state: &RoomState,
    ) -> StoreResult<(RoomState, bool)> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(state)?;
        let reply: Vec<String> = self
            .create_or_get
            .key(keys::room_state(room_id))
            .arg(body)
            .invoke_async(&mut conn)
            .await?;

        match (reply.first().map(String::as_str), reply.get(1)) {
            (Some("CREATED"), Some(raw)) => Ok((serde_json::from_str(raw)?, true)),
            (Some("EXISTS"), Some(raw)) => Ok((serde_json::from_str(raw)?, false)),
            _ => Err(StoreError::ScriptReply("create_or_get".into())),
        }
    }

    pub async fn get(&self, room_id: &str) -> StoreResult<Option<RoomState>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(keys::room_state(room_id))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Adjusts participantCount by `delta`; returns the new count, or `None`
    /// when the room record is gone.
    pub async fn add_participants(&self, room_id: &str, delta: i32) -> StoreResult<Option<u32>> {
        let mut conn = self.conn.clone();
        let count: i64 = self
            .add_participant
            .key(keys::room_state(room_id))
            .arg(delta)
            .invoke_async(&mut conn)
            .await?;
        if count < 0 {
            return Ok(None);
        }
        Ok(Some(count as u32))
    }

    pub async fn delete(&self, room_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .del(keys::room_state(room_id))
            .del(keys::room_activity(room_id))
            .query_async::<()>(&mut conn)
            .await?;
        debug!(room_id, "room state deleted");
        Ok(())
    }

    /// Refreshes the activity key; its TTL expiry is what makes a room a
    /// candidate for auto-close.
    pub async fn touch_activity(&self, room_id: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(keys::room_activity(room_id))
            .arg(1)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Cursored SCAN over `room:state:*`; never a blocking global listing.
    pub async fn scan_room_ids(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut ids = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::ROOM_STATE_SCAN_PATTERN)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            ids.extend(
                batch
                    .iter()
                    .filter_map(|k| keys::room_id_from_state_key(k))
                    .map(str::to_string),
            );
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(ids)
    }

    /// One pipeline per candidate batch: `EXISTS activity` + `GET state`.
    pub async fn inactivity_probe(
        &self,
        room_ids: &[String],
    ) -> StoreResult<Vec<(String, bool, Option<RoomState>)>> {
        if room_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for id in room_ids {
            pipe.exists(keys::room_activity(id));
            pipe.get(keys::room_state(id));
        }
        let replies: Vec<redis::Value> = pipe.query_async(&mut conn).await?;

        let mut out = Vec::with_capacity(room_ids.len());
        for (i, id) in room_ids.iter().enumerate() {
            let active = matches!(replies.get(i * 2), Some(redis::Value::Int(1)));
            let state = match replies.get(i * 2 + 1) {
                Some(redis::Value::BulkString(raw)) => serde_json::from_slice(raw).ok(),
                _ => None,
            };
            out.push((id.clone(), active, state));
        }
        Ok(out)
    }
}
