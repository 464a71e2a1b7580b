use redis::aio::ConnectionManager;
use tracing::debug;

use crate::error::StoreResult;
use crate::keys;

/// Socket-set entries expire unless refreshed by the connection heartbeat.
const SOCKET_TTL_SECS: u64 = 60;

/// Shared-store indices for cross-instance targeted delivery:
/// `userId -> set<connId>` and `userId -> roomId`.
#[derive(Clone)]
pub struct UserIndexes {
    conn: ConnectionManager,
}

impl UserIndexes {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn add_socket(&self, user_id: i64, conn_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .sadd(keys::user_sockets(user_id), conn_id)
            .expire(keys::user_sockets(user_id), SOCKET_TTL_SECS as i64)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(user_id, conn_id, "socket registered");
        Ok(())
    }

    pub async fn remove_socket(&self, user_id: i64, conn_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SREM")
            .arg(keys::user_sockets(user_id))
            .arg(conn_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Heartbeat: refreshes the TTL of the user's socket set.
    pub async fn touch_sockets(&self, user_id: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("EXPIRE")
            .arg(keys::user_sockets(user_id))
            .arg(SOCKET_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_sockets(&self, user_id: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("SMEMBERS")
            .arg(keys::user_sockets(user_id))
            .query_async(&mut conn)
            .await?)
    }

    pub async fn set_room(&self, user_id: i64, room_id: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(keys::user_room(user_id))
            .arg(room_id)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn clear_room(&self, user_id: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(keys::user_room(user_id))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get_room(&self, user_id: i64) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("GET")
            .arg(keys::user_room(user_id))
            .query_async(&mut conn)
            .await?)
    }
}
