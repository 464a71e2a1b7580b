use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub backend: BackendSettings,
    pub mediasoup: MediasoupSettings,
    pub rooms: RoomSettings,
    pub gifts: GiftSettings,
    pub relay: RelaySettings,
    pub rate_limits: RateLimitSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    /// Origins accepted during the WebSocket handshake. Requests without an
    /// Origin header (non-browser clients) are always accepted.
    pub allowed_origins: Vec<String>,
    /// Stable identifier for this node, used to tag pub/sub envelopes so a
    /// node does not re-deliver its own fan-out.
    pub node_id: String,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisSettings {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub issuer: String,
    /// Ceiling applied to tokens that carry no `exp` claim.
    pub max_age_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub internal_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediasoupSettings {
    pub num_workers: u32,
    pub listen_ip: String,
    pub announced_ip: String,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoomSettings {
    pub max_seats: u8,
    pub inactivity_ttl_secs: u64,
    pub autoclose_poll_secs: u64,
    /// Invite TTL, store-driven (no timers).
    pub invite_ttl_secs: u64,
    pub owner_cache_ttl_secs: u64,
    pub role_cache_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GiftSettings {
    pub flush_interval_ms: u64,
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub channel: String,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateLimitRule {
    pub capacity: u32,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSettings {
    pub chat: RateLimitRule,
    pub gift: RateLimitRule,
    pub gift_prepare: RateLimitRule,
    pub query: RateLimitRule,
}

impl Settings {
    pub fn load() -> Result<Self, SettingsError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("VOXROOM"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.allowed_origins", Vec::<String>::new())?
            .set_default("app.node_id", "")?
            .set_default("app.shutdown_timeout_secs", 30)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.issuer", "voxroom")?
            .set_default("jwt.max_age_secs", 86400)?
            .set_default("backend.base_url", "http://localhost:4000")?
            .set_default("backend.internal_key", "")?
            .set_default("backend.timeout_secs", 10)?
            .set_default("mediasoup.num_workers", 2)?
            .set_default("mediasoup.listen_ip", "0.0.0.0")?
            .set_default("mediasoup.announced_ip", "127.0.0.1")?
            .set_default("mediasoup.rtc_min_port", 40000)?
            .set_default("mediasoup.rtc_max_port", 49999)?
            .set_default("rooms.max_seats", 15)?
            .set_default("rooms.inactivity_ttl_secs", 30)?
            .set_default("rooms.autoclose_poll_secs", 30)?
            .set_default("rooms.invite_ttl_secs", 30)?
            .set_default("rooms.owner_cache_ttl_secs", 300)?
            .set_default("rooms.role_cache_ttl_secs", 30)?
            .set_default("gifts.flush_interval_ms", 500)?
            .set_default("gifts.max_retries", 3)?
            .set_default("relay.channel", "voxroom:events")?
            .set_default("rate_limits.chat.capacity", 10)?
            .set_default("rate_limits.chat.window_secs", 10)?
            .set_default("rate_limits.gift.capacity", 5)?
            .set_default("rate_limits.gift.window_secs", 10)?
            .set_default("rate_limits.gift_prepare.capacity", 10)?
            .set_default("rate_limits.gift_prepare.window_secs", 60)?
            .set_default("rate_limits.query.capacity", 30)?
            .set_default("rate_limits.query.window_secs", 10)?
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        if settings.app.node_id.is_empty() {
            settings.app.node_id = format!("node-{}", std::process::id());
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Fail-fast environment validation, run once at startup.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.jwt.secret.is_empty() {
            return Err(SettingsError::Invalid("jwt.secret must not be empty".into()));
        }
        if self.mediasoup.num_workers == 0 {
            return Err(SettingsError::Invalid(
                "mediasoup.num_workers must be at least 1".into(),
            ));
        }
        if self.mediasoup.rtc_min_port >= self.mediasoup.rtc_max_port {
            return Err(SettingsError::Invalid(format!(
                "mediasoup rtc port range is inverted: {}..{}",
                self.mediasoup.rtc_min_port, self.mediasoup.rtc_max_port
            )));
        }
        if self.rooms.max_seats == 0 || self.rooms.max_seats > 15 {
            return Err(SettingsError::Invalid(format!(
                "rooms.max_seats must be in 1..=15, got {}",
                self.rooms.max_seats
            )));
        }
        if self.gifts.flush_interval_ms == 0 {
            return Err(SettingsError::Invalid(
                "gifts.flush_interval_ms must be positive".into(),
            ));
        }
        if self.relay.channel.is_empty() {
            return Err(SettingsError::Invalid("relay.channel must not be empty".into()));
        }
        for rule in [
            self.rate_limits.chat,
            self.rate_limits.gift,
            self.rate_limits.gift_prepare,
            self.rate_limits.query,
        ] {
            if rule.capacity == 0 || rule.window_secs == 0 {
                return Err(SettingsError::Invalid(
                    "rate limit rules need a positive capacity and window".into(),
                ));
            }
        }
        Ok(())
    }
}
