use redis::Script;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::StoreError;
use crate::keys;

#[derive(Debug, Error)]
pub enum SeatError {
    #[error("Seat index out of range")]
    Invalid,
    #[error("Seat is locked")]
    Locked,
    #[error("Seat is taken")]
    Taken,
    #[error("Seat is occupied")]
    Occupied,
    #[error("User is not seated")]
    NotSeated,
    #[error("Seat is already locked")]
    AlreadyLocked,
    #[error("Seat is not locked")]
    NotLocked,
    #[error("An invite is already pending")]
    InvitePending,
    #[error("No invite for this user")]
    NoInvite,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<redis::RedisError> for SeatError {
    fn from(e: redis::RedisError) -> Self {
        SeatError::Store(StoreError::Redis(e))
    }
}

pub type SeatResult<T> = Result<T, SeatError>;

/// Occupant entry stored per seat in the room's seat hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatState {
    pub user_id: i64,
    pub muted: bool,
}

/// Pending invite, stored with a TTL so expiry needs no timers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatInvite {
    pub target_user_id: i64,
    pub invited_by: i64,
    pub seat_index: u8,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TakenSeat {
    pub seat_index: u8,
    /// Prior seat of the same user, cleared in the same script.
    pub cleared: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedInvite {
    pub seat_index: u8,
    /// The seat was locked and has been unlocked as part of the accept.
    pub unlocked: bool,
    pub cleared: Option<u8>,
}

// Claim a seat. Clears the requester's prior seat in the same round-trip so
// a user can never hold two seats of one room.
const CLAIM_SEAT: &str = r#"
local seats = KEYS[1]
local locked = KEYS[2]
local seat = ARGV[1]
local uid = ARGV[2]
if redis.call('SISMEMBER', locked, seat) == 1 then
  return {'LOCKED'}
end
local cur = redis.call('HGET', seats, seat)
if cur then
  if tostring(cjson.decode(cur).userId) == uid then
    return {'OK', seat, '-1'}
  end
  return {'TAKEN'}
end
local prev = '-1'
local all = redis.call('HGETALL', seats)
for i = 1, #all, 2 do
  if tostring(cjson.decode(all[i + 1]).userId) == uid then
    prev = all[i]
    redis.call('HDEL', seats, all[i])
    break
  end
end
redis.call('HSET', seats, seat, ARGV[3])
return {'OK', seat, prev}
"#;

const CLEAR_USER_SEAT: &str = r#"
local all = redis.call('HGETALL', KEYS[1])
for i = 1, #all, 2 do
  if tostring(cjson.decode(all[i + 1]).userId) == ARGV[1] then
    redis.call('HDEL', KEYS[1], all[i])
    return {'OK', all[i]}
  end
end
return {'NONE'}
"#;

const SET_MUTE: &str = r#"
local cur = redis.call('HGET', KEYS[1], ARGV[1])
if not cur then
  return {'NONE'}
end
local entry = cjson.decode(cur)
entry.muted = ARGV[2] == '1'
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(entry))
return {'OK', tostring(entry.userId)}
"#;

// Locking an occupied seat kicks the occupant in the same script.
const LOCK_SEAT: &str = r#"
if redis.call('SISMEMBER', KEYS[2], ARGV[1]) == 1 then
  return {'ALREADY'}
end
redis.call('SADD', KEYS[2], ARGV[1])
local cur = redis.call('HGET', KEYS[1], ARGV[1])
if cur then
  redis.call('HDEL', KEYS[1], ARGV[1])
  return {'OK', tostring(cjson.decode(cur).userId)}
end
return {'OK'}
"#;

const UNLOCK_SEAT: &str = r#"
if redis.call('SREM', KEYS[1], ARGV[1]) == 0 then
  return {'NOT_LOCKED'}
end
return {'OK'}
"#;

// Uniqueness: one invite per seat AND one per (room, target). Both the
// invite body and the reverse index are written with the same TTL.
const CREATE_INVITE: &str = r#"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
  return {'OCCUPIED'}
end
local all = redis.call('HGETALL', KEYS[1])
for i = 1, #all, 2 do
  if tostring(cjson.decode(all[i + 1]).userId) == ARGV[4] then
    return {'OCCUPIED'}
  end
end
if redis.call('EXISTS', KEYS[2]) == 1 then
  return {'PENDING'}
end
if redis.call('EXISTS', KEYS[3]) == 1 then
  return {'PENDING'}
end
redis.call('SET', KEYS[2], ARGV[2], 'EX', ARGV[3])
redis.call('SET', KEYS[3], ARGV[1], 'EX', ARGV[3])
return {'OK'}
"#;

// Accept resolves the seat via the reverse index, auto-unlocks a locked
// seat, and seats the target, all in one round-trip.
const ACCEPT_INVITE: &str = r#"
local seatIdx = redis.call('GET', KEYS[3])
if not seatIdx then
  return {'NO_INVITE'}
end
local inviteKey = ARGV[2] .. seatIdx
local raw = redis.call('GET', inviteKey)
if not raw then
  redis.call('DEL', KEYS[3])
  return {'NO_INVITE'}
end
if tostring(cjson.decode(raw).targetUserId) ~= ARGV[1] then
  return {'NO_INVITE'}
end
redis.call('DEL', inviteKey)
redis.call('DEL', KEYS[3])
local unlocked = '0'
if redis.call('SISMEMBER', KEYS[2], seatIdx) == 1 then
  redis.call('SREM', KEYS[2], seatIdx)
  unlocked = '1'
end
if redis.call('HEXISTS', KEYS[1], seatIdx) == 1 then
  return {'TAKEN'}
end
local prev = '-1'
local all = redis.call('HGETALL', KEYS[1])
for i = 1, #all, 2 do
  if tostring(cjson.decode(all[i + 1]).userId) == ARGV[1] then
    prev = all[i]
    redis.call('HDEL', KEYS[1], all[i])
    break
  end
end
redis.call('HSET', KEYS[1], seatIdx, ARGV[3])
return {'OK', seatIdx, unlocked, prev}
"#;

const DECLINE_INVITE: &str = r#"
local seatIdx = redis.call('GET', KEYS[1])
if not seatIdx then
  return {'NO_INVITE'}
end
redis.call('DEL', ARGV[1] .. seatIdx)
redis.call('DEL', KEYS[1])
return {'OK', seatIdx}
"#;

const DELETE_INVITE: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return {'NONE'}
end
redis.call('DEL', KEYS[1])
redis.call('DEL', ARGV[1] .. tostring(cjson.decode(raw).targetUserId))
return {'OK'}
"#;

/// Atomic seat state per room. All mutations are single-round-trip Lua
/// scripts so no two nodes can grant the same seat.
pub struct SeatRepository {
    conn: ConnectionManager,
    claim: Script,
    clear_user: Script,
    set_mute: Script,
    lock: Script,
    unlock: Script,
    create_invite: Script,
    accept_invite: Script,
    decline_invite: Script,
    delete_invite: Script,
}

impl SeatRepository {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            claim: Script::new(CLAIM_SEAT),
            clear_user: Script::new(CLEAR_USER_SEAT),
            set_mute: Script::new(SET_MUTE),
            lock: Script::new(LOCK_SEAT),
            unlock: Script::new(UNLOCK_SEAT),
            create_invite: Script::new(CREATE_INVITE),
            accept_invite: Script::new(ACCEPT_INVITE),
            decline_invite: Script::new(DECLINE_INVITE),
            delete_invite: Script::new(DELETE_INVITE),
        }
    }

    /// Takes a seat for `user_id`, clearing any prior seat of the same user.
    pub async fn take_seat(
        &self,
        room_id: &str,
        user_id: i64,
        seat_index: u8,
        seat_count: u8,
    ) -> SeatResult<TakenSeat> {
        if seat_index >= seat_count {
            return Err(SeatError::Invalid);
        }
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .claim
            .key(keys::room_seats(room_id))
            .key(keys::room_locked_seats(room_id))
            .arg(seat_index)
            .arg(user_id)
            .arg(seat_json(user_id))
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => {
                debug!(room_id, user_id, seat_index, "seat taken");
                Ok(TakenSeat {
                    seat_index,
                    cleared: parse_cleared(reply.get(2)),
                })
            }
            "LOCKED" => Err(SeatError::Locked),
            "TAKEN" => Err(SeatError::Taken),
            other => Err(unexpected(other)),
        }
    }

    /// Seats `target_user_id` on behalf of the room owner. Same script as
    /// take; contention against the target surfaces as `Occupied`.
    pub async fn assign_seat(
        &self,
        room_id: &str,
        target_user_id: i64,
        seat_index: u8,
        seat_count: u8,
    ) -> SeatResult<TakenSeat> {
        match self
            .take_seat(room_id, target_user_id, seat_index, seat_count)
            .await
        {
            Err(SeatError::Taken) => Err(SeatError::Occupied),
            other => other,
        }
    }

    /// Clears the seat held by `user_id`, returning its index.
    pub async fn leave_seat(&self, room_id: &str, user_id: i64) -> SeatResult<u8> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .clear_user
            .key(keys::room_seats(room_id))
            .arg(user_id)
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => parse_seat_index(reply.get(1)),
            "NONE" => Err(SeatError::NotSeated),
            other => Err(unexpected(other)),
        }
    }

    /// Owner-driven removal. Identical store semantics to `leave_seat`; the
    /// caller maps the error to its own code.
    pub async fn remove_seat(&self, room_id: &str, user_id: i64) -> SeatResult<u8> {
        self.leave_seat(room_id, user_id).await
    }

    /// Sets the mute flag on a seat, returning the occupant, or `None` when
    /// the seat is empty.
    pub async fn set_mute(
        &self,
        room_id: &str,
        seat_index: u8,
        muted: bool,
    ) -> SeatResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .set_mute
            .key(keys::room_seats(room_id))
            .arg(seat_index)
            .arg(if muted { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => Ok(Some(parse_user_id(reply.get(1))?)),
            "NONE" => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    /// Locks a seat. An occupant is kicked in the same script and returned.
    pub async fn lock_seat(&self, room_id: &str, seat_index: u8) -> SeatResult<Option<i64>> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .lock
            .key(keys::room_seats(room_id))
            .key(keys::room_locked_seats(room_id))
            .arg(seat_index)
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => match reply.get(1) {
                Some(uid) => Ok(Some(parse_user_id(Some(uid))?)),
                None => Ok(None),
            },
            "ALREADY" => Err(SeatError::AlreadyLocked),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unlock_seat(&self, room_id: &str, seat_index: u8) -> SeatResult<()> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .unlock
            .key(keys::room_locked_seats(room_id))
            .arg(seat_index)
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => Ok(()),
            "NOT_LOCKED" => Err(SeatError::NotLocked),
            other => Err(unexpected(other)),
        }
    }

    /// Creates an invite for `(seat, target)` with both uniqueness rules
    /// enforced in-script, and both keys written with the TTL.
    pub async fn create_invite(
        &self,
        room_id: &str,
        seat_index: u8,
        target_user_id: i64,
        invited_by: i64,
        ttl_secs: u64,
    ) -> SeatResult<SeatInvite> {
        let invite = SeatInvite {
            target_user_id,
            invited_by,
            seat_index,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        let body = serde_json::to_string(&invite).map_err(StoreError::Json)?;

        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .create_invite
            .key(keys::room_seats(room_id))
            .key(keys::seat_invite(room_id, seat_index))
            .key(keys::seat_invite_user(room_id, target_user_id))
            .arg(seat_index)
            .arg(body)
            .arg(ttl_secs)
            .arg(target_user_id)
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => Ok(invite),
            "OCCUPIED" => Err(SeatError::Occupied),
            "PENDING" => Err(SeatError::InvitePending),
            other => Err(unexpected(other)),
        }
    }

    /// Accepts the pending invite of `user_id`: deletes both invite keys,
    /// auto-unlocks the seat when locked, and seats the user atomically.
    pub async fn accept_invite(&self, room_id: &str, user_id: i64) -> SeatResult<AcceptedInvite> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .accept_invite
            .key(keys::room_seats(room_id))
            .key(keys::room_locked_seats(room_id))
            .key(keys::seat_invite_user(room_id, user_id))
            .arg(user_id)
            .arg(format!("room:{room_id}:invite:"))
            .arg(seat_json(user_id))
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => Ok(AcceptedInvite {
                seat_index: parse_seat_index(reply.get(1))?,
                unlocked: reply.get(2).map(|s| s == "1").unwrap_or(false),
                cleared: parse_cleared(reply.get(3)),
            }),
            "NO_INVITE" => Err(SeatError::NoInvite),
            "TAKEN" => Err(SeatError::Taken),
            other => Err(unexpected(other)),
        }
    }

    /// Declines the pending invite of `user_id`, returning the seat it was
    /// attached to.
    pub async fn decline_invite(&self, room_id: &str, user_id: i64) -> SeatResult<u8> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .decline_invite
            .key(keys::seat_invite_user(room_id, user_id))
            .arg(format!("room:{room_id}:invite:"))
            .invoke_async(&mut conn)
            .await?;

        match reply_code(&reply)? {
            "OK" => parse_seat_index(reply.get(1)),
            "NO_INVITE" => Err(SeatError::NoInvite),
            other => Err(unexpected(other)),
        }
    }

    /// Deletes the invite attached to a seat, if any.
    pub async fn delete_invite(&self, room_id: &str, seat_index: u8) -> SeatResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .delete_invite
            .key(keys::seat_invite(room_id, seat_index))
            .arg(format!("room:{room_id}:invite:user:"))
            .invoke_async(&mut conn)
            .await?;

        Ok(reply_code(&reply)? == "OK")
    }

    /// O(1) lookup of the invite pending for `user_id` via the reverse index.
    pub async fn get_invite_by_user(
        &self,
        room_id: &str,
        user_id: i64,
    ) -> SeatResult<Option<SeatInvite>> {
        let mut conn = self.conn.clone();
        let seat_index: Option<u8> = redis::cmd("GET")
            .arg(keys::seat_invite_user(room_id, user_id))
            .query_async(&mut conn)
            .await?;
        let Some(seat_index) = seat_index else {
            return Ok(None);
        };
        let raw: Option<String> = redis::cmd("GET")
            .arg(keys::seat_invite(room_id, seat_index))
            .query_async(&mut conn)
            .await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(StoreError::Json)?)),
            None => Ok(None),
        }
    }

    /// Snapshot of the seat hash and locked set, read in one pipeline.
    pub async fn snapshot(&self, room_id: &str) -> SeatResult<(Vec<(u8, SeatState)>, Vec<u8>)> {
        let mut conn = self.conn.clone();
        let (raw_seats, locked): (std::collections::HashMap<String, String>, Vec<u8>) =
            redis::pipe()
                .hgetall(keys::room_seats(room_id))
                .smembers(keys::room_locked_seats(room_id))
                .query_async(&mut conn)
                .await?;

        let mut seats = Vec::with_capacity(raw_seats.len());
        for (idx, raw) in raw_seats {
            let idx: u8 = idx
                .parse()
                .map_err(|_| StoreError::ScriptReply(format!("bad seat index {idx}")))?;
            let state: SeatState = serde_json::from_str(&raw).map_err(StoreError::Json)?;
            seats.push((idx, state));
        }
        seats.sort_by_key(|(idx, _)| *idx);
        Ok((seats, locked))
    }

    /// Seats with a pending invite, for join snapshots. Reverse-index keys
    /// share the invite prefix and are filtered out by shape.
    pub async fn pending_invite_seats(&self, room_id: &str) -> SeatResult<Vec<u8>> {
        let mut conn = self.conn.clone();
        let prefix = format!("room:{room_id}:invite:");
        let mut seats = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::seat_invite_pattern(room_id))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            seats.extend(
                batch
                    .iter()
                    .filter_map(|k| k.strip_prefix(&prefix))
                    .filter_map(|rest| rest.parse::<u8>().ok()),
            );
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        seats.sort_unstable();
        Ok(seats)
    }

    /// Deletes all seat state of a room: seat hash, locked set, and every
    /// invite/reverse key found via cursored SCAN.
    pub async fn clear_room(&self, room_id: &str) -> SeatResult<()> {
        let mut conn = self.conn.clone();
        let mut invite_keys: Vec<String> = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(keys::seat_invite_pattern(room_id))
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            invite_keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        let mut pipe = redis::pipe();
        pipe.del(keys::room_seats(room_id))
            .del(keys::room_locked_seats(room_id));
        for key in invite_keys {
            pipe.del(key);
        }
        pipe.query_async::<()>(&mut conn).await?;
        debug!(room_id, "seat state cleared");
        Ok(())
    }
}

fn seat_json(user_id: i64) -> String {
    format!(r#"{{"userId":{user_id},"muted":false}}"#)
}

fn reply_code(reply: &[String]) -> SeatResult<&str> {
    reply
        .first()
        .map(String::as_str)
        .ok_or_else(|| unexpected("empty reply"))
}

fn parse_seat_index(raw: Option<&String>) -> SeatResult<u8> {
    raw.and_then(|s| s.parse().ok())
        .ok_or_else(|| unexpected("missing seat index"))
}

fn parse_user_id(raw: Option<&String>) -> SeatResult<i64> {
    raw.and_then(|s| s.parse().ok())
        .ok_or_else(|| unexpected("missing user id"))
}

/// `-1` marks "no prior seat" in script replies.
fn parse_cleared(raw: Option<&String>) -> Option<u8> {
    raw.and_then(|s| s.parse::<i16>().ok())
        .and_then(|v| u8::try_from(v).ok())
}

fn unexpected(what: impl Into<String>) -> SeatError {
    SeatError::Store(StoreError::ScriptReply(what.into()))
}
