use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use voxroom_config::Settings;
use voxroom_services::auth::AuthGate;
use voxroom_services::autoclose::AutoCloseLoop;
use voxroom_services::backend::BackendClient;
use voxroom_services::gifts::GiftBatcher;
use voxroom_services::media::room_manager::RoomRegistry;
use voxroom_services::media::worker_pool::WorkerPool;
use voxroom_services::relay::RelayIngress;
use voxroom_services::roles::RoleCache;
use voxroom_services::seats::SeatCoordinator;
use voxroom_services::sink::{Broadcaster, EventSink, RelayPublisher};
use voxroom_store::gifts::GiftQueue;
use voxroom_store::indexes::UserIndexes;
use voxroom_store::rate_limit::RateLimiter;
use voxroom_store::revocation::RevocationList;
use voxroom_store::rooms::RoomStore;
use voxroom_store::seats::SeatRepository;

use crate::ws::storage::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub auth: Arc<AuthGate>,
    pub connections: Arc<ConnectionRegistry>,
    pub rooms: Arc<RoomRegistry>,
    pub seats: Arc<SeatRepository>,
    pub seat_ops: Arc<SeatCoordinator>,
    pub gifts: Arc<GiftBatcher>,
    pub rate_limiter: RateLimiter,
    pub indexes: UserIndexes,
    pub broadcaster: Arc<Broadcaster>,
    pub room_store: RoomStore,
    /// Flips to true once shutdown begins; socket loops watch it.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Builds the full service graph and spawns the background loops
    /// (gift flush, auto-close, relay ingress, worker supervisor).
    /// Returned handles are awaited during graceful shutdown.
    pub async fn new(
        settings: Settings,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<(Self, Vec<JoinHandle<()>>)> {
        let redis_conn = voxroom_store::connect(&settings).await?;
        // The pub/sub subscription needs its own connection.
        let redis_client = redis::Client::open(settings.redis.url.as_str())?;

        let connections = Arc::new(ConnectionRegistry::new());
        let local_sink: Arc<dyn EventSink> = connections.clone();

        let publisher = RelayPublisher::new(
            redis_conn.clone(),
            settings.relay.channel.clone(),
            settings.app.node_id.clone(),
        );
        let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&local_sink), publisher));

        let revocations = RevocationList::new(redis_conn.clone());
        let auth = Arc::new(AuthGate::new(
            &settings.jwt,
            settings.app.allowed_origins.clone(),
            revocations,
        ));

        let backend = Arc::new(BackendClient::new(&settings.backend)?);
        let roles = Arc::new(RoleCache::new(
            Arc::clone(&backend),
            settings.rooms.owner_cache_ttl_secs,
            settings.rooms.role_cache_ttl_secs,
        ));

        let seats = Arc::new(SeatRepository::new(redis_conn.clone()));
        let indexes = UserIndexes::new(redis_conn.clone());
        let room_store = RoomStore::new(redis_conn.clone());
        let rate_limiter = RateLimiter::new(redis_conn.clone());

        let (worker_pool, mut death_rx) = WorkerPool::new(&settings.mediasoup).await?;

        let rooms = Arc::new(RoomRegistry::new(
            Arc::clone(&worker_pool),
            room_store.clone(),
            Arc::clone(&seats),
            indexes.clone(),
            Arc::clone(&backend),
            Arc::clone(&roles),
            Arc::clone(&broadcaster),
            &settings,
        ));

        let seat_ops = Arc::new(SeatCoordinator::new(
            Arc::clone(&seats),
            room_store.clone(),
            Arc::clone(&rooms),
            Arc::clone(&roles),
            Arc::clone(&broadcaster),
            settings.rooms.invite_ttl_secs,
        ));

        let gifts = Arc::new(GiftBatcher::new(
            GiftQueue::new(redis_conn.clone()),
            Arc::clone(&backend),
            Arc::clone(&broadcaster),
            &settings.gifts,
        ));

        let mut tasks = Vec::new();

        tasks.push(Arc::clone(&gifts).spawn(shutdown.clone()));

        let autoclose = Arc::new(AutoCloseLoop::new(
            room_store.clone(),
            Arc::clone(&rooms),
            settings.rooms.autoclose_poll_secs,
        ));
        tasks.push(autoclose.spawn(shutdown.clone()));

        let ingress = Arc::new(RelayIngress::new(
            Arc::clone(&local_sink),
            settings.relay.channel.clone(),
            settings.app.node_id.clone(),
        ));
        let ingress_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = ingress.run(redis_client, ingress_shutdown).await {
                error!(%e, "relay ingress failed");
            }
        }));

        // Worker deaths close the orphaned rooms before the worker is
        // re-created.
        let supervisor_rooms = Arc::clone(&rooms);
        let supervisor_pool = Arc::clone(&worker_pool);
        let mut supervisor_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    idx = death_rx.recv() => {
                        let Some(idx) = idx else { break };
                        supervisor_rooms.handle_worker_death(idx).await;
                        supervisor_pool.respawn(idx).await;
                    }
                    _ = supervisor_shutdown.changed() => break,
                }
            }
        }));

        Ok((
            Self {
                settings,
                auth,
                connections,
                rooms,
                seats,
                seat_ops,
                gifts,
                rate_limiter,
                indexes,
                broadcaster,
                room_store,
                shutdown,
            },
            tasks,
        ))
    }
}
