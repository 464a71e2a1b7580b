use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unexpected script reply: {0}")]
    ScriptReply(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
