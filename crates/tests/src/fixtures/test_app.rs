use jsonwebtoken::{EncodingKey, Header, encode};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;
use uuid::Uuid;
use voxroom_api::{build_router, state::AppState};
use voxroom_config::Settings;

use super::mock_backend::MockBackend;

/// Rotates each TestApp onto its own numbered Redis database so globally
/// named keys (the gift queues) never cross between concurrent tests.
static NEXT_DB: AtomicUsize = AtomicUsize::new(0);

/// A running test application wired to a mock backend and the local Redis.
///
/// Requires a running Redis at localhost:6379 (override with
/// VOXROOM__REDIS__URL).
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub backend: MockBackend,
    pub client: reqwest::Client,
    shutdown: watch::Sender<bool>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn with customized settings; the `mutator` runs after test
    /// defaults are applied.
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let backend = MockBackend::spawn().await;

        let mut settings = test_settings();
        settings.backend.base_url = backend.base_url.clone();
        if let Ok(url) = std::env::var("VOXROOM__REDIS__URL") {
            settings.redis.url = url;
        }
        let db = NEXT_DB.fetch_add(1, Ordering::Relaxed) % 15 + 1;
        settings.redis.url = format!("{}/{db}", settings.redis.url.trim_end_matches('/'));
        // Per-app channel and node id keep fan-out isolated between tests.
        settings.relay.channel = format!("voxroom:test:{}", Uuid::new_v4().simple());
        settings.app.node_id = format!("test-node-{}", Uuid::new_v4().simple());
        mutator(&mut settings);

        voxroom_services::metrics::register_metrics();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (app_state, _tasks) = AppState::new(settings.clone(), shutdown_rx)
            .await
            .expect("Failed to create AppState");
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::new();

        Self {
            addr,
            base_url,
            settings,
            backend,
            client,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    /// A valid access token for the given user.
    pub fn token_for(&self, user_id: i64, name: &str) -> String {
        self.sign_token(user_id, name, chrono::Utc::now().timestamp() + 3600)
    }

    pub fn expired_token_for(&self, user_id: i64, name: &str) -> String {
        self.sign_token(user_id, name, chrono::Utc::now().timestamp() - 60)
    }

    fn sign_token(&self, user_id: i64, name: &str, exp: i64) -> String {
        #[derive(Serialize)]
        struct Claims<'a> {
            sub: String,
            name: &'a str,
            iat: i64,
            exp: i64,
            iss: &'a str,
        }
        let claims = Claims {
            sub: user_id.to_string(),
            name,
            iat: chrono::Utc::now().timestamp() - 10,
            exp,
            iss: &self.settings.jwt.issuer,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.settings.jwt.secret.as_bytes()),
        )
        .expect("Failed to sign test token")
    }

    /// A seat repository bound to this app's Redis database, for exercising
    /// store semantics (TTL expiry) that have no wire-level trigger.
    pub async fn seat_repo(&self) -> voxroom_store::seats::SeatRepository {
        let client =
            redis::Client::open(self.settings.redis.url.as_str()).expect("Bad Redis URL");
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .expect("Failed to connect to Redis");
        voxroom_store::seats::SeatRepository::new(conn)
    }

    /// Direct store access for assertions and seeding (e.g. revocations).
    pub async fn redis(&self) -> redis::aio::MultiplexedConnection {
        let client =
            redis::Client::open(self.settings.redis.url.as_str()).expect("Bad Redis URL");
        client
            .get_multiplexed_tokio_connection()
            .await
            .expect("Failed to connect to Redis")
    }

    /// A unique room id per call so tests never collide in the shared store.
    pub fn unique_room(&self) -> String {
        format!("room-{}", Uuid::new_v4().simple())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

fn test_settings() -> Settings {
    Settings {
        app: voxroom_config::AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            allowed_origins: vec![],
            node_id: "test-node".to_string(),
            shutdown_timeout_secs: 5,
        },
        redis: voxroom_config::RedisSettings {
            url: "redis://127.0.0.1:6379".to_string(),
        },
        jwt: voxroom_config::JwtSettings {
            secret: "test-secret-key-for-jwt-signing-minimum-32-chars".to_string(),
            issuer: "voxroom".to_string(),
            max_age_secs: 86400,
        },
        backend: voxroom_config::BackendSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            internal_key: "test-internal-key".to_string(),
            timeout_secs: 5,
        },
        mediasoup: voxroom_config::MediasoupSettings {
            num_workers: 1,
            listen_ip: "127.0.0.1".to_string(),
            announced_ip: "127.0.0.1".to_string(),
            rtc_min_port: 40000,
            rtc_max_port: 40999,
        },
        rooms: voxroom_config::RoomSettings {
            max_seats: 15,
            inactivity_ttl_secs: 30,
            autoclose_poll_secs: 30,
            invite_ttl_secs: 30,
            owner_cache_ttl_secs: 300,
            role_cache_ttl_secs: 30,
        },
        gifts: voxroom_config::GiftSettings {
            flush_interval_ms: 100,
            max_retries: 2,
        },
        relay: voxroom_config::RelaySettings {
            channel: "voxroom:test".to_string(),
        },
        rate_limits: voxroom_config::RateLimitSettings {
            chat: voxroom_config::RateLimitRule {
                capacity: 10,
                window_secs: 10,
            },
            gift: voxroom_config::RateLimitRule {
                capacity: 20,
                window_secs: 10,
            },
            gift_prepare: voxroom_config::RateLimitRule {
                capacity: 10,
                window_secs: 60,
            },
            query: voxroom_config::RateLimitRule {
                capacity: 50,
                window_secs: 10,
            },
        },
    }
}
