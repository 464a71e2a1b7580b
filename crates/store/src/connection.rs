use redis::aio::ConnectionManager;
use tracing::info;
use voxroom_config::Settings;

/// Connects to Redis and returns a multiplexed connection manager.
///
/// The manager transparently reconnects on broken connections, so one clone
/// per repository is enough for the process lifetime.
pub async fn connect(settings: &Settings) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(settings.redis.url.as_str())?;
    let mut manager = ConnectionManager::new(client).await?;

    // Verify connection
    redis::cmd("PING").query_async::<()>(&mut manager).await?;

    info!(url = %settings.redis.url, "Connected to Redis");

    Ok(manager)
}
