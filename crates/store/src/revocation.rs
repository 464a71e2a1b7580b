use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

use crate::error::StoreResult;
use crate::keys;

/// Stable hash of a credential; the raw token never reaches the store.
pub fn credential_hash(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Revoked-credential set consulted at connect time.
#[derive(Clone)]
pub struct RevocationList {
    conn: ConnectionManager,
}

impl RevocationList {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn is_revoked(&self, token: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(redis::cmd("EXISTS")
            .arg(keys::revoked(&credential_hash(token)))
            .query_async(&mut conn)
            .await?)
    }

    /// Marks a credential revoked until `ttl_secs` (normally the token's
    /// remaining lifetime).
    pub async fn revoke(&self, token: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(keys::revoked(&credential_hash(token)))
            .arg(1)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}
