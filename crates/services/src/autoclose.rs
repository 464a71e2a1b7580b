use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxroom_store::rooms::RoomStore;

use crate::media::room_manager::RoomRegistry;

/// Periodic sweep closing rooms whose activity TTL expired while holding
/// zero participants. Single-flight: a pass that outlives the interval is
/// never overlapped.
pub struct AutoCloseLoop {
    room_store: RoomStore,
    registry: Arc<RoomRegistry>,
    poll_interval: Duration,
    in_flight: AtomicBool,
}

impl AutoCloseLoop {
    pub fn new(room_store: RoomStore, registry: Arc<RoomRegistry>, poll_secs: u64) -> Self {
        Self {
            room_store,
            registry,
            poll_interval: Duration::from_secs(poll_secs),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if self
                            .in_flight
                            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                            .is_err()
                        {
                            debug!("auto-close pass still running, skipping tick");
                            continue;
                        }
                        self.pass().await;
                        self.in_flight.store(false, Ordering::Release);
                    }
                    _ = shutdown.changed() => {
                        info!("auto-close loop stopped");
                        break;
                    }
                }
            }
        })
    }

    /// One sweep. Any read error leaves the room alone; closing a live room
    /// is worse than closing an idle one late.
    async fn pass(&self) {
        let room_ids = match self.room_store.scan_room_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(%e, "auto-close scan failed");
                return;
            }
        };
        if room_ids.is_empty() {
            return;
        }

        let probes = match self.room_store.inactivity_probe(&room_ids).await {
            Ok(probes) => probes,
            Err(e) => {
                warn!(%e, "auto-close probe failed");
                return;
            }
        };

        for (room_id, has_activity, state) in probes {
            let idle = !has_activity
                && state
                    .as_ref()
                    .is_some_and(|s| s.participant_count == 0);
            if idle {
                info!(room_id, "closing inactive room");
                self.registry.close_room(&room_id, "inactivity").await;
            }
        }
    }
}
