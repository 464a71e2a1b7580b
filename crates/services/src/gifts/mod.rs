use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voxroom_config::GiftSettings;
use voxroom_store::gifts::{GiftQueue, GiftTransaction};

use crate::backend::BackendClient;
use crate::events::ServerEvent;
use crate::metrics::{GIFT_BATCH_SIZE, GIFT_DEAD_LETTER, GIFTS_ENQUEUED_TOTAL};
use crate::sink::Broadcaster;

/// Failure code reported to senders when a gift exhausts its retry budget.
pub const PROCESSING_FAILED: &str = "PROCESSING_FAILED";

/// Flushes the durable gift queue to the backend in time windows, retries
/// full-call failures with a bounded budget, and dead-letters the rest.
/// Every enqueued gift ends as a backend success, a `gift:error` to its
/// sender, or a dead-letter entry.
pub struct GiftBatcher {
    queue: GiftQueue,
    backend: Arc<BackendClient>,
    broadcaster: Arc<Broadcaster>,
    flush_interval: Duration,
    max_retries: u32,
}

impl GiftBatcher {
    pub fn new(
        queue: GiftQueue,
        backend: Arc<BackendClient>,
        broadcaster: Arc<Broadcaster>,
        settings: &GiftSettings,
    ) -> Self {
        Self {
            queue,
            backend,
            broadcaster,
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
            max_retries: settings.max_retries,
        }
    }

    pub async fn enqueue(&self, tx: &GiftTransaction) -> Result<(), voxroom_store::StoreError> {
        self.queue.enqueue(tx).await?;
        GIFTS_ENQUEUED_TOTAL.inc();
        Ok(())
    }

    /// Runs the flush loop until shutdown, then performs a final flush.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.flush_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.flush().await;
                    }
                    _ = shutdown.changed() => {
                        self.flush().await;
                        info!("gift batcher stopped after final flush");
                        break;
                    }
                }
            }
        })
    }

    async fn flush(&self) {
        let claimed = match self.queue.claim_pending().await {
            Ok(Some(claimed)) => claimed,
            Ok(None) => return,
            Err(e) => {
                warn!(%e, "Failed to claim pending gifts");
                return;
            }
        };
        let (processing_key, batch) = claimed;
        GIFT_BATCH_SIZE.observe(batch.len() as f64);

        match self.backend.gift_batch(&batch).await {
            Ok(response) => {
                debug!(
                    processed = response.processed_count,
                    failed = response.failed.len(),
                    "gift batch settled"
                );
                for failure in &response.failed {
                    let Some(tx) = batch
                        .iter()
                        .find(|tx| tx.transaction_id == failure.transaction_id)
                    else {
                        continue;
                    };
                    self.broadcaster
                        .connection(
                            &tx.sender_conn_id,
                            &ServerEvent::GiftError {
                                transaction_id: failure.transaction_id,
                                code: failure.code.clone(),
                                reason: failure.reason.clone(),
                            },
                        )
                        .await;
                }
                if let Err(e) = self.queue.ack(&processing_key).await {
                    warn!(%e, "Failed to drop settled gift batch");
                }
            }
            Err(e) => {
                warn!(%e, size = batch.len(), "Gift batch call failed, redistributing");
                for mut tx in batch {
                    tx.retry_count += 1;
                    if tx.retry_count >= self.max_retries {
                        if let Err(e) = self.queue.dead_letter(&tx).await {
                            warn!(%e, transaction_id = %tx.transaction_id, "Failed to dead-letter gift");
                            continue;
                        }
                        self.broadcaster
                            .connection(
                                &tx.sender_conn_id,
                                &ServerEvent::GiftError {
                                    transaction_id: tx.transaction_id,
                                    code: serde_json::json!(PROCESSING_FAILED),
                                    reason: "Gift processing failed".to_string(),
                                },
                            )
                            .await;
                    } else if let Err(e) = self.queue.requeue(&tx).await {
                        warn!(%e, transaction_id = %tx.transaction_id, "Failed to requeue gift");
                    }
                }
                if let Ok(len) = self.queue.dead_letter_len().await {
                    GIFT_DEAD_LETTER.set(len as i64);
                }
                if let Err(e) = self.queue.ack(&processing_key).await {
                    warn!(%e, "Failed to drop redistributed gift batch");
                }
            }
        }
    }
}
