use mediasoup::worker::{Worker, WorkerSettings};
use mediasoup::worker_manager::WorkerManager;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use voxroom_config::MediasoupSettings;

use crate::metrics::WORKER_RESTARTS_TOTAL;

/// Grace period before re-binding the dead worker's RTC port range.
const PORT_REUSE_DELAY: Duration = Duration::from_secs(5);
const RESPAWN_ATTEMPTS: u32 = 3;

struct WorkerSlot {
    worker: RwLock<Worker>,
    /// Routers currently hosted on this worker.
    load: AtomicUsize,
}

/// Pool of mediasoup workers. New rooms land on the least-loaded worker;
/// dead workers are reported on the death channel and re-created with
/// bounded retry.
pub struct WorkerPool {
    manager: WorkerManager,
    slots: Vec<WorkerSlot>,
    settings: MediasoupSettings,
    death_tx: mpsc::UnboundedSender<usize>,
}

impl WorkerPool {
    /// Creates the pool and the receiver surfacing worker deaths. The
    /// receiver fires before re-creation so the registry can close orphaned
    /// rooms first.
    pub async fn new(
        settings: &MediasoupSettings,
    ) -> anyhow::Result<(Arc<Self>, mpsc::UnboundedReceiver<usize>)> {
        let manager = WorkerManager::new();
        let (death_tx, death_rx) = mpsc::unbounded_channel();

        let mut slots = Vec::with_capacity(settings.num_workers as usize);
        for i in 0..settings.num_workers as usize {
            let worker = spawn_worker(&manager, settings, i, &death_tx).await?;
            slots.push(WorkerSlot {
                worker: RwLock::new(worker),
                load: AtomicUsize::new(0),
            });
        }

        Ok((
            Arc::new(Self {
                manager,
                slots,
                settings: settings.clone(),
                death_tx,
            }),
            death_rx,
        ))
    }

    /// Picks the worker currently hosting the fewest routers.
    pub fn least_loaded(&self) -> (usize, Worker) {
        let idx = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.load.load(Ordering::Relaxed))
            .map(|(i, _)| i)
            .unwrap_or(0);
        (idx, self.slots[idx].worker.read().clone())
    }

    pub fn inc_load(&self, idx: usize) {
        if let Some(slot) = self.slots.get(idx) {
            slot.load.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dec_load(&self, idx: usize) {
        if let Some(slot) = self.slots.get(idx) {
            let _ = slot
                .load
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                    Some(v.saturating_sub(1))
                });
        }
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Replaces a dead worker: waits out port reuse, then retries creation
    /// with exponential backoff (1, 2, 4 s).
    pub async fn respawn(&self, idx: usize) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };

        tokio::time::sleep(PORT_REUSE_DELAY).await;

        for attempt in 0..RESPAWN_ATTEMPTS {
            match spawn_worker(&self.manager, &self.settings, idx, &self.death_tx).await {
                Ok(worker) => {
                    *slot.worker.write() = worker;
                    slot.load.store(0, Ordering::Relaxed);
                    WORKER_RESTARTS_TOTAL.inc();
                    info!(worker_idx = idx, "mediasoup worker re-created");
                    return;
                }
                Err(e) => {
                    let backoff = Duration::from_secs(1 << attempt);
                    warn!(
                        worker_idx = idx,
                        attempt = attempt + 1,
                        %e,
                        "worker re-creation failed, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        error!(worker_idx = idx, "giving up on worker re-creation");
    }
}

async fn spawn_worker(
    manager: &WorkerManager,
    settings: &MediasoupSettings,
    idx: usize,
    death_tx: &mpsc::UnboundedSender<usize>,
) -> anyhow::Result<Worker> {
    let mut worker_settings = WorkerSettings::default();
    worker_settings.rtc_port_range = settings.rtc_min_port..=settings.rtc_max_port;

    let worker = manager
        .create_worker(worker_settings)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create mediasoup worker {}: {}", idx, e))?;

    let worker_id = worker.id();
    let tx = death_tx.clone();
    worker
        .on_dead(move |reason| {
            error!(?reason, %worker_id, worker_idx = idx, "mediasoup worker died");
            let _ = tx.send(idx);
        })
        .detach();

    info!(worker_id = %worker.id(), "mediasoup worker {} created", idx);
    Ok(worker)
}
