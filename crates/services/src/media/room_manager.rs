use dashmap::DashMap;
use mediasoup::prelude::*;
use mediasoup::webrtc_transport::{
    WebRtcTransportListenInfos, WebRtcTransportOptions, WebRtcTransportRemoteParameters,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::num::{NonZero, NonZeroU16};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use voxroom_config::Settings;
use voxroom_store::StoreError;
use voxroom_store::indexes::UserIndexes;
use voxroom_store::rooms::{RoomState, RoomStatus, RoomStore};
use voxroom_store::seats::{SeatError, SeatRepository};

use crate::backend::{BackendClient, BackendError, RoomStatusUpdate};
use crate::events::ServerEvent;
use crate::metrics::{ROOMS_CLOSED_TOTAL, ROOMS_HOSTED};
use crate::roles::RoleCache;
use crate::sink::Broadcaster;

use super::worker_pool::WorkerPool;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Room not found")]
    RoomNotFound,
    #[error("Transport limit reached")]
    TransportLimit,
    #[error("Transport not found")]
    TransportNotFound,
    #[error("Producer not found")]
    ProducerNotFound,
    #[error("Consumer not found")]
    ConsumerNotFound,
    #[error("Cannot consume: incompatible capabilities")]
    CannotConsume,
    #[error("Not authorized")]
    NotAuthorized,
    #[error("SFU failure: {0}")]
    Sfu(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Room not found")]
    RoomNotFound,
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Seat(#[from] SeatError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Ownership tag attached to every producer and consumer.
#[derive(Debug, Clone)]
pub struct MediaAppData {
    pub user_id: i64,
    pub room_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Producer,
    Consumer,
}

/// Media state for one WebSocket connection in one room. At most two
/// transports: one producer-side, one consumer-side.
pub struct ParticipantMedia {
    pub user_id: i64,
    producer_transport: Option<WebRtcTransport>,
    consumer_transport: Option<WebRtcTransport>,
    /// Transports whose DTLS handshake already completed, for idempotent
    /// connect.
    connected: Vec<TransportId>,
    producers: Vec<Producer>,
    consumers: Vec<Consumer>,
}

/// A room hosted on this node: its router, observer, and media state.
pub struct MediaRoom {
    pub room_id: String,
    pub router: Router,
    audio_observer: AudioLevelObserver,
    pub worker_idx: usize,
    participants: DashMap<String, ParticipantMedia>,
}

/// Transport connection details sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

/// Consumer details sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerInfo {
    pub id: String,
    pub producer_id: String,
    pub kind: String,
    pub rtp_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerInfo {
    pub producer_id: String,
    pub user_id: i64,
}

pub struct JoinOutcome {
    pub state: RoomState,
    pub created: bool,
    pub rtp_capabilities: Option<serde_json::Value>,
    pub participant_count: u32,
}

/// Map of active rooms to their router and media state, plus the shared
/// room records arbitrating the fleet-wide singleton.
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<MediaRoom>>,
    worker_pool: Arc<WorkerPool>,
    room_store: RoomStore,
    seats: Arc<SeatRepository>,
    indexes: UserIndexes,
    backend: Arc<BackendClient>,
    roles: Arc<RoleCache>,
    broadcaster: Arc<Broadcaster>,
    listen_ip: IpAddr,
    announced_ip: Option<String>,
    node_id: String,
    inactivity_ttl_secs: u64,
}

impl RoomRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_pool: Arc<WorkerPool>,
        room_store: RoomStore,
        seats: Arc<SeatRepository>,
        indexes: UserIndexes,
        backend: Arc<BackendClient>,
        roles: Arc<RoleCache>,
        broadcaster: Arc<Broadcaster>,
        settings: &Settings,
    ) -> Self {
        let listen_ip: IpAddr = settings
            .mediasoup
            .listen_ip
            .parse()
            .unwrap_or_else(|_| "0.0.0.0".parse().unwrap());

        let announced_ip = if settings.mediasoup.announced_ip.is_empty() {
            None
        } else {
            Some(settings.mediasoup.announced_ip.clone())
        };

        Self {
            rooms: DashMap::new(),
            worker_pool,
            room_store,
            seats,
            indexes,
            backend,
            roles,
            broadcaster,
            listen_ip,
            announced_ip,
            node_id: settings.app.node_id.clone(),
            inactivity_ttl_secs: settings.rooms.inactivity_ttl_secs,
        }
    }

    /// Looks up or creates the room, attaches the user, and returns the
    /// snapshot material. The room owner always comes from the backend;
    /// client-supplied owner fields are never trusted.
    pub async fn join_room(
        &self,
        room_id: &str,
        user_id: i64,
        seat_count: u8,
    ) -> Result<JoinOutcome, RegistryError> {
        let owner_id = self
            .roles
            .owner_of(room_id)
            .await?
            .ok_or(RegistryError::RoomNotFound)?;

        let desired = RoomState {
            status: RoomStatus::Active,
            owner_id,
            seat_count,
            participant_count: 0,
            created_at: chrono::Utc::now().timestamp_millis(),
            host_node: self.node_id.clone(),
        };
        let (state, created) = self.room_store.create_or_get(room_id, &desired).await?;

        // Exactly one node hosts the router. Create it when we won the
        // record, or re-create after a restart left a stale record behind.
        if state.host_node == self.node_id && !self.rooms.contains_key(room_id) {
            self.host_room(room_id).await?;
            if created {
                let update = RoomStatusUpdate {
                    live: true,
                    participant_count: 0,
                    started_at: Some(state.created_at),
                    ended_at: None,
                };
                if let Err(e) = self.backend.room_status(room_id, &update).await {
                    warn!(room_id, %e, "Failed to report room live");
                }
            }
        }

        let participant_count = self
            .room_store
            .add_participants(room_id, 1)
            .await?
            .unwrap_or(1);
        self.indexes.set_room(user_id, room_id).await?;
        self.touch_activity(room_id).await;

        let rtp_capabilities = self.rooms.get(room_id).map(|room| {
            serde_json::to_value(room.router.rtp_capabilities()).unwrap_or_default()
        });

        info!(room_id, user_id, participant_count, "user joined room");
        Ok(JoinOutcome {
            state,
            created,
            rtp_capabilities,
            participant_count,
        })
    }

    async fn host_room(&self, room_id: &str) -> Result<(), RegistryError> {
        let (worker_idx, worker) = self.worker_pool.least_loaded();

        let router = worker
            .create_router(RouterOptions::new(media_codecs()))
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to create router: {e}")))?;

        let mut observer_options = AudioLevelObserverOptions::default();
        observer_options.max_entries = NonZeroU16::new(3).unwrap_or(NonZeroU16::MIN);
        observer_options.threshold = -50;
        observer_options.interval = 200;

        let audio_observer = router
            .create_audio_level_observer(observer_options)
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to create audio observer: {e}")))?;

        spawn_speaker_task(
            room_id.to_string(),
            &audio_observer,
            Arc::clone(&self.broadcaster),
        );

        self.worker_pool.inc_load(worker_idx);
        ROOMS_HOSTED.inc();

        self.rooms.insert(
            room_id.to_string(),
            Arc::new(MediaRoom {
                room_id: room_id.to_string(),
                router,
                audio_observer,
                worker_idx,
                participants: DashMap::new(),
            }),
        );

        info!(room_id, worker_idx, "room hosted");
        Ok(())
    }

    /// Detaches a user: frees their seat, media, and indices, and reports
    /// an empty room to the backend. Returns the cleared seat, if any.
    pub async fn leave_room(
        &self,
        room_id: &str,
        user_id: i64,
        conn_id: &str,
    ) -> Result<Option<u8>, RegistryError> {
        let cleared = match self.seats.leave_seat(room_id, user_id).await {
            Ok(seat) => Some(seat),
            Err(SeatError::NotSeated) => None,
            Err(e) => return Err(e.into()),
        };

        self.close_participant(room_id, conn_id);
        self.indexes.clear_room(user_id).await?;

        let remaining = self.room_store.add_participants(room_id, -1).await?;
        if remaining == Some(0) {
            let update = RoomStatusUpdate {
                live: false,
                participant_count: 0,
                started_at: None,
                ended_at: None,
            };
            if let Err(e) = self.backend.room_status(room_id, &update).await {
                warn!(room_id, %e, "Failed to report empty room");
            }
        }
        self.touch_activity(room_id).await;

        debug!(room_id, user_id, conn_id, "user left room");
        Ok(cleared)
    }

    /// Closes a room everywhere: broadcast, backend, router, seat state,
    /// shared record.
    pub async fn close_room(&self, room_id: &str, reason: &str) {
        self.broadcaster
            .room(
                room_id,
                &ServerEvent::RoomClosed {
                    room_id: room_id.to_string(),
                    reason: reason.to_string(),
                    ts: chrono::Utc::now().timestamp_millis(),
                },
                None,
            )
            .await;

        let update = RoomStatusUpdate {
            live: false,
            participant_count: 0,
            started_at: None,
            ended_at: Some(chrono::Utc::now().timestamp_millis()),
        };
        if let Err(e) = self.backend.room_status(room_id, &update).await {
            warn!(room_id, %e, "Failed to report room closed");
        }

        if let Some((_, room)) = self.rooms.remove(room_id) {
            // Dropping the room closes the router, observer, and all
            // transports/producers/consumers hosted on it.
            self.worker_pool.dec_load(room.worker_idx);
            ROOMS_HOSTED.dec();
        }

        if let Err(e) = self.seats.clear_room(room_id).await {
            warn!(room_id, %e, "Failed to clear seat state");
        }
        if let Err(e) = self.room_store.delete(room_id).await {
            warn!(room_id, %e, "Failed to delete room state");
        }
        self.roles.forget_room(room_id);

        ROOMS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
        info!(room_id, reason, "room closed");
    }

    /// Called when a worker dies, before it is re-created: every room it
    /// hosted is closed so clients can rejoin onto a fresh router.
    pub async fn handle_worker_death(&self, worker_idx: usize) {
        let orphaned: Vec<String> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().worker_idx == worker_idx)
            .map(|entry| entry.key().clone())
            .collect();
        warn!(worker_idx, rooms = orphaned.len(), "closing rooms of dead worker");
        for room_id in orphaned {
            self.close_room(&room_id, "worker_died").await;
        }
    }

    /// Refreshes the room's activity key; expiry drives auto-close.
    pub async fn touch_activity(&self, room_id: &str) {
        if let Err(e) = self
            .room_store
            .touch_activity(room_id, self.inactivity_ttl_secs)
            .await
        {
            warn!(room_id, %e, "Failed to record room activity");
        }
    }

    pub fn hosts_room(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn hosted_room_count(&self) -> usize {
        self.rooms.len()
    }

    // --- media plane -----------------------------------------------------

    fn room(&self, room_id: &str) -> Result<Arc<MediaRoom>, MediaError> {
        self.rooms
            .get(room_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(MediaError::RoomNotFound)
    }

    /// Creates the WebRTC transport of the given kind for a connection.
    /// A connection holds at most one of each kind.
    pub async fn create_transport(
        &self,
        room_id: &str,
        conn_id: &str,
        user_id: i64,
        kind: TransportKind,
    ) -> Result<TransportOptions, MediaError> {
        let room = self.room(room_id)?;

        {
            let participant = room.participants.get(conn_id);
            let slot_taken = participant
                .as_ref()
                .map(|p| match kind {
                    TransportKind::Producer => p.producer_transport.is_some(),
                    TransportKind::Consumer => p.consumer_transport.is_some(),
                })
                .unwrap_or(false);
            if slot_taken {
                return Err(MediaError::TransportLimit);
            }
        }

        let transport = self.create_webrtc_transport(&room.router).await?;
        let options = transport_to_options(&transport);

        let mut participant = room
            .participants
            .entry(conn_id.to_string())
            .or_insert_with(|| ParticipantMedia {
                user_id,
                producer_transport: None,
                consumer_transport: None,
                connected: Vec::new(),
                producers: Vec::new(),
                consumers: Vec::new(),
            });
        match kind {
            TransportKind::Producer => participant.producer_transport = Some(transport),
            TransportKind::Consumer => participant.consumer_transport = Some(transport),
        }

        debug!(room_id, conn_id, ?kind, transport_id = %options.id, "transport created");
        Ok(options)
    }

    /// Completes the DTLS handshake. Idempotent: a second connect on the
    /// same transport is a no-op.
    pub async fn connect_transport(
        &self,
        room_id: &str,
        conn_id: &str,
        transport_id: &str,
        dtls_parameters: DtlsParameters,
    ) -> Result<(), MediaError> {
        let room = self.room(room_id)?;
        let tid =
            TransportId::from_str(transport_id).map_err(|_| MediaError::TransportNotFound)?;

        // Clone the handle out so the SFU call happens without holding the
        // participant lock.
        let transport = {
            let participant = room
                .participants
                .get(conn_id)
                .ok_or(MediaError::TransportNotFound)?;
            if participant.connected.contains(&tid) {
                return Ok(());
            }
            participant
                .transport_by_id(tid)
                .ok_or(MediaError::TransportNotFound)?
        };

        transport
            .connect(WebRtcTransportRemoteParameters { dtls_parameters })
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to connect transport: {e}")))?;

        if let Some(mut participant) = room.participants.get_mut(conn_id) {
            participant.connected.push(tid);
        }
        debug!(room_id, conn_id, transport_id, "transport connected");
        Ok(())
    }

    /// Creates an audio producer on the connection's producer transport and
    /// registers it with the room's audio level observer.
    pub async fn produce(
        &self,
        room_id: &str,
        conn_id: &str,
        user_id: i64,
        transport_id: &str,
        rtp_parameters: RtpParameters,
    ) -> Result<String, MediaError> {
        let room = self.room(room_id)?;
        let tid =
            TransportId::from_str(transport_id).map_err(|_| MediaError::TransportNotFound)?;

        let transport = {
            let participant = room
                .participants
                .get(conn_id)
                .ok_or(MediaError::TransportNotFound)?;
            let transport = participant
                .producer_transport
                .clone()
                .ok_or(MediaError::TransportNotFound)?;
            if transport.id() != tid {
                return Err(MediaError::TransportNotFound);
            }
            transport
        };

        let mut producer_options = ProducerOptions::new(MediaKind::Audio, rtp_parameters);
        producer_options.app_data = AppData::new(MediaAppData {
            user_id,
            room_id: room_id.to_string(),
        });

        let producer = transport
            .produce(producer_options)
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to produce: {e}")))?;
        let producer_id = producer.id().to_string();

        if let Err(e) = room
            .audio_observer
            .add_producer(RtpObserverAddProducerOptions::new(producer.id()))
            .await
        {
            warn!(room_id, %producer_id, %e, "Failed to observe producer");
        }

        if let Some(mut participant) = room.participants.get_mut(conn_id) {
            participant.producers.push(producer);
        }

        debug!(room_id, conn_id, %producer_id, "producer created");
        Ok(producer_id)
    }

    /// Creates a consumer, always paused until the client resumes it.
    pub async fn consume(
        &self,
        room_id: &str,
        conn_id: &str,
        user_id: i64,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerInfo, MediaError> {
        let room = self.room(room_id)?;
        let pid = ProducerId::from_str(producer_id).map_err(|_| MediaError::ProducerNotFound)?;
        let tid =
            TransportId::from_str(transport_id).map_err(|_| MediaError::TransportNotFound)?;

        if !room.router.can_consume(&pid, &rtp_capabilities) {
            return Err(MediaError::CannotConsume);
        }

        let transport = {
            let participant = room
                .participants
                .get(conn_id)
                .ok_or(MediaError::TransportNotFound)?;
            let transport = participant
                .consumer_transport
                .clone()
                .ok_or(MediaError::TransportNotFound)?;
            if transport.id() != tid {
                return Err(MediaError::TransportNotFound);
            }
            transport
        };

        let mut consumer_options = ConsumerOptions::new(pid, rtp_capabilities);
        consumer_options.paused = true;
        consumer_options.app_data = AppData::new(MediaAppData {
            user_id,
            room_id: room_id.to_string(),
        });

        let consumer = transport
            .consume(consumer_options)
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to consume: {e}")))?;

        let info = ConsumerInfo {
            id: consumer.id().to_string(),
            producer_id: consumer.producer_id().to_string(),
            kind: media_kind_str(consumer.kind()).to_string(),
            rtp_parameters: serde_json::to_value(consumer.rtp_parameters())
                .unwrap_or_default(),
        };

        if let Some(mut participant) = room.participants.get_mut(conn_id) {
            participant.consumers.push(consumer);
        }

        debug!(room_id, conn_id, consumer_id = %info.id, producer_id, "consumer created");
        Ok(info)
    }

    /// Resumes a consumer. Resuming an already-running consumer is a no-op.
    pub async fn resume_consumer(
        &self,
        room_id: &str,
        conn_id: &str,
        consumer_id: &str,
    ) -> Result<(), MediaError> {
        let room = self.room(room_id)?;
        let cid = ConsumerId::from_str(consumer_id).map_err(|_| MediaError::ConsumerNotFound)?;

        let consumer = {
            let participant = room
                .participants
                .get(conn_id)
                .ok_or(MediaError::ConsumerNotFound)?;
            participant
                .consumers
                .iter()
                .find(|c| c.id() == cid)
                .cloned()
                .ok_or(MediaError::ConsumerNotFound)?
        };

        consumer
            .resume()
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to resume consumer: {e}")))?;
        debug!(room_id, conn_id, consumer_id, "consumer resumed");
        Ok(())
    }

    /// Self mute/unmute: the producer must belong to the calling user.
    pub async fn set_own_producer_paused(
        &self,
        room_id: &str,
        conn_id: &str,
        user_id: i64,
        producer_id: &str,
        paused: bool,
    ) -> Result<(), MediaError> {
        let room = self.room(room_id)?;
        let pid = ProducerId::from_str(producer_id).map_err(|_| MediaError::ProducerNotFound)?;

        let producer = {
            let participant = room
                .participants
                .get(conn_id)
                .ok_or(MediaError::ProducerNotFound)?;
            participant
                .producers
                .iter()
                .find(|p| p.id() == pid)
                .cloned()
                .ok_or(MediaError::ProducerNotFound)?
        };

        let owned = producer
            .app_data()
            .downcast_ref::<MediaAppData>()
            .map(|d| d.user_id == user_id)
            .unwrap_or(false);
        if !owned {
            return Err(MediaError::NotAuthorized);
        }

        set_paused(&producer, paused).await?;
        debug!(room_id, producer_id, paused, "producer pause toggled by owner");
        Ok(())
    }

    /// Server-enforced mute mirror: pauses or resumes every audio producer
    /// of a user in the room.
    pub async fn set_user_audio_paused(
        &self,
        room_id: &str,
        user_id: i64,
        paused: bool,
    ) -> Result<(), MediaError> {
        let Ok(room) = self.room(room_id) else {
            // The room is hosted elsewhere; its node mirrors the mute.
            return Ok(());
        };

        let producers: Vec<Producer> = room
            .participants
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .flat_map(|entry| entry.value().producers.clone())
            .collect();

        for producer in producers {
            set_paused(&producer, paused).await?;
        }
        debug!(room_id, user_id, paused, "user audio pause mirrored");
        Ok(())
    }

    /// Closes every audio producer of a user, e.g. when a lock kicks them
    /// off a seat. Dropping the handle closes it SFU-side.
    pub fn close_user_audio_producers(&self, room_id: &str, user_id: i64) -> Vec<String> {
        let Ok(room) = self.room(room_id) else {
            return Vec::new();
        };
        let mut closed = Vec::new();
        for mut entry in room.participants.iter_mut() {
            if entry.value().user_id != user_id {
                continue;
            }
            for producer in entry.value_mut().producers.drain(..) {
                closed.push(producer.id().to_string());
            }
        }
        if !closed.is_empty() {
            debug!(room_id, user_id, count = closed.len(), "audio producers closed");
        }
        closed
    }

    /// Frees all media owned by a connection.
    pub fn close_participant(&self, room_id: &str, conn_id: &str) {
        if let Some(room) = self.rooms.get(room_id) {
            // Dropping ParticipantMedia closes transports/producers/consumers.
            room.participants.remove(conn_id);
            debug!(room_id, conn_id, "participant media closed");
        }
    }

    /// Producers visible to a joining connection (everyone else's).
    pub fn producers_snapshot(&self, room_id: &str, exclude_conn_id: &str) -> Vec<ProducerInfo> {
        let Ok(room) = self.room(room_id) else {
            return Vec::new();
        };
        room.participants
            .iter()
            .filter(|entry| entry.key() != exclude_conn_id)
            .flat_map(|entry| {
                let user_id = entry.value().user_id;
                entry
                    .value()
                    .producers
                    .iter()
                    .map(move |p| ProducerInfo {
                        producer_id: p.id().to_string(),
                        user_id,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    async fn create_webrtc_transport(
        &self,
        router: &Router,
    ) -> Result<WebRtcTransport, MediaError> {
        let udp_info = ListenInfo {
            protocol: Protocol::Udp,
            ip: self.listen_ip,
            announced_address: self.announced_ip.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let tcp_info = ListenInfo {
            protocol: Protocol::Tcp,
            ip: self.listen_ip,
            announced_address: self.announced_ip.clone(),
            port: None,
            port_range: None,
            flags: None,
            send_buffer_size: None,
            recv_buffer_size: None,
            expose_internal_ip: false,
        };

        let listen_infos = WebRtcTransportListenInfos::new(udp_info).insert(tcp_info);
        let mut transport_options = WebRtcTransportOptions::new(listen_infos);
        transport_options.enable_udp = true;
        transport_options.enable_tcp = true;
        transport_options.prefer_udp = true;

        router
            .create_webrtc_transport(transport_options)
            .await
            .map_err(|e| MediaError::Sfu(format!("Failed to create WebRtcTransport: {e}")))
    }
}

impl ParticipantMedia {
    fn transport_by_id(&self, tid: TransportId) -> Option<WebRtcTransport> {
        [&self.producer_transport, &self.consumer_transport]
            .into_iter()
            .flatten()
            .find(|t| t.id() == tid)
            .cloned()
    }
}

async fn set_paused(producer: &Producer, paused: bool) -> Result<(), MediaError> {
    let result = if paused {
        producer.pause().await
    } else {
        producer.resume().await
    };
    result.map_err(|e| MediaError::Sfu(format!("Failed to toggle producer pause: {e}")))
}

fn media_kind_str(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Audio => "audio",
        MediaKind::Video => "video",
    }
}

/// Forwards observer volume reports to the room as `speaker:active`,
/// emitting only when the dominant-speaker set actually changes.
fn spawn_speaker_task(
    room_id: String,
    observer: &AudioLevelObserver,
    broadcaster: Arc<Broadcaster>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<i64>>();

    let volumes_tx = tx.clone();
    observer
        .on_volumes(move |volumes| {
            let speakers: Vec<i64> = volumes
                .iter()
                .filter_map(|v| {
                    v.producer
                        .app_data()
                        .downcast_ref::<MediaAppData>()
                        .map(|d| d.user_id)
                })
                .collect();
            let _ = volumes_tx.send(speakers);
        })
        .detach();

    observer
        .on_silence(move || {
            let _ = tx.send(Vec::new());
        })
        .detach();

    // The task ends when the observer (and with it both senders) drops.
    tokio::spawn(async move {
        let mut last: Vec<i64> = Vec::new();
        while let Some(speakers) = rx.recv().await {
            if same_set(&speakers, &last) {
                continue;
            }
            last = speakers.clone();
            broadcaster
                .room(
                    &room_id,
                    &ServerEvent::ActiveSpeakers {
                        active_speakers: speakers,
                        ts: chrono::Utc::now().timestamp_millis(),
                    },
                    None,
                )
                .await;
        }
    });
}

fn same_set(a: &[i64], b: &[i64]) -> bool {
    let mut a: Vec<i64> = a.to_vec();
    let mut b: Vec<i64> = b.to_vec();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    a == b
}

/// Audio-only room codec: Opus.
fn media_codecs() -> Vec<RtpCodecCapability> {
    vec![RtpCodecCapability::Audio {
        mime_type: MimeTypeAudio::Opus,
        preferred_payload_type: Some(111),
        clock_rate: NonZero::new(48000).unwrap(),
        channels: NonZero::new(2).unwrap(),
        parameters: RtpCodecParametersParameters::default(),
        rtcp_feedback: vec![RtcpFeedback::TransportCc],
    }]
}
