use redis::Script;
use redis::aio::ConnectionManager;
use voxroom_config::RateLimitRule;

use crate::error::StoreResult;
use crate::keys;

// INCR + PEXPIRE in one script so the window starts exactly when the first
// token is spent, and stays correct across nodes.
const TOKEN_BUCKET: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis-backed token bucket keyed by `(action, userId[, scope])`.
#[derive(Clone)]
pub struct RateLimiter {
    conn: ConnectionManager,
    script: std::sync::Arc<Script>,
}

impl RateLimiter {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: std::sync::Arc::new(Script::new(TOKEN_BUCKET)),
        }
    }

    /// Spends one token. Returns `false` when the bucket is exhausted.
    pub async fn allow(
        &self,
        action: &str,
        user_id: i64,
        scope: Option<&str>,
        rule: RateLimitRule,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .script
            .key(keys::rate_limit(action, user_id, scope))
            .arg(rule.window_secs * 1000)
            .invoke_async(&mut conn)
            .await?;
        Ok(count <= rule.capacity as u64)
    }
}
