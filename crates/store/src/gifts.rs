use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::keys;

/// A gift awaiting settlement by the backend. Durable in the pending list
/// until settled, retried, or dead-lettered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftTransaction {
    pub transaction_id: Uuid,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub gift_id: i64,
    pub quantity: u32,
    pub room_id: String,
    pub ts: i64,
    /// Connection that sent the gift; failure notices are targeted here.
    pub sender_conn_id: String,
    #[serde(default)]
    pub retry_count: u32,
}

/// Durable gift queue: pending list, per-flush processing list, dead letter.
#[derive(Clone)]
pub struct GiftQueue {
    conn: ConnectionManager,
}

impl GiftQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn enqueue(&self, tx: &GiftTransaction) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(tx)?;
        redis::cmd("RPUSH")
            .arg(keys::GIFTS_PENDING)
            .arg(body)
            .query_async::<()>(&mut conn)
            .await?;
        debug!(transaction_id = %tx.transaction_id, "gift enqueued");
        Ok(())
    }

    /// Atomically claims the whole pending list by renaming it to a
    /// processing key, eliminating the read-then-clear race. Returns `None`
    /// when the queue is empty.
    pub async fn claim_pending(&self) -> StoreResult<Option<(String, Vec<GiftTransaction>)>> {
        let mut conn = self.conn.clone();
        let processing = keys::gifts_processing(chrono::Utc::now().timestamp_millis());

        let renamed: Result<(), redis::RedisError> = redis::cmd("RENAME")
            .arg(keys::GIFTS_PENDING)
            .arg(&processing)
            .query_async(&mut conn)
            .await;
        if let Err(e) = renamed {
            // RENAME on an absent source means the queue is empty.
            if e.kind() == redis::ErrorKind::ResponseError {
                return Ok(None);
            }
            return Err(StoreError::Redis(e));
        }

        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(&processing)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let mut batch = Vec::with_capacity(raw.len());
        for item in raw {
            batch.push(serde_json::from_str(&item)?);
        }
        Ok(Some((processing, batch)))
    }

    /// Drops a processing list once its batch has been settled.
    pub async fn ack(&self, processing_key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(processing_key)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Puts a transaction back on the pending list after a failed flush.
    pub async fn requeue(&self, tx: &GiftTransaction) -> StoreResult<()> {
        self.enqueue(tx).await
    }

    pub async fn dead_letter(&self, tx: &GiftTransaction) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let body = serde_json::to_string(tx)?;
        redis::cmd("RPUSH")
            .arg(keys::GIFTS_DEAD_LETTER)
            .arg(body)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn dead_letter_len(&self) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("LLEN")
            .arg(keys::GIFTS_DEAD_LETTER)
            .query_async(&mut conn)
            .await?)
    }
}
