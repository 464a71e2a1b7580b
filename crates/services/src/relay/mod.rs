use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::events::RelayEnvelope;
use crate::metrics::{RELAY_DURATION_SECONDS, RELAY_EVENTS_TOTAL, RELAY_IN_FLIGHT};
use crate::sink::EventSink;

/// Event names this service is willing to forward from the pub/sub channel.
/// Everything else is rejected without delivery. The list covers our own
/// broadcast surface (cross-node fan-out rides the same channel) plus the
/// backend-originated domain events clients understand.
pub const RELAY_EVENT_ALLOWLIST: &[&str] = &[
    "room:userJoined",
    "room:userLeft",
    "room:closed",
    "audio:newProducer",
    "speaker:active",
    "seat:updated",
    "seat:cleared",
    "seat:locked",
    "seat:userMuted",
    "seat:invite:received",
    "seat:invite:pending",
    "chat:message",
    "gift:received",
    "gift:error",
    "gift:prepare",
    "wallet:updated",
    "profile:updated",
    "vip:levelChanged",
    "announcement:broadcast",
    "moderation:warning",
];

pub fn is_allowed(event: &str) -> bool {
    RELAY_EVENT_ALLOWLIST.contains(&event)
}

/// Subscribes to the shared channel and routes envelopes to the right
/// subset of local connections. Payloads pass through unvalidated; only
/// the envelope itself is checked.
pub struct RelayIngress {
    sink: Arc<dyn EventSink>,
    channel: String,
    node_id: String,
}

impl RelayIngress {
    pub fn new(sink: Arc<dyn EventSink>, channel: String, node_id: String) -> Self {
        Self {
            sink,
            channel,
            node_id,
        }
    }

    /// Consumes the subscription until shutdown. The pub/sub connection is
    /// dedicated; command traffic stays on the shared manager.
    pub async fn run(
        self: Arc<Self>,
        client: redis::Client,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        info!(channel = %self.channel, "relay subscribed");

        let mut stream = pubsub.on_message();
        loop {
            tokio::select! {
                message = stream.next() => {
                    let Some(message) = message else {
                        warn!("relay subscription ended");
                        break;
                    };
                    let payload: String = match message.get_payload() {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(%e, "Unreadable relay message dropped");
                            continue;
                        }
                    };
                    let ingress = Arc::clone(&self);
                    RELAY_IN_FLIGHT.inc();
                    tokio::spawn(async move {
                        ingress.handle(&payload).await;
                        RELAY_IN_FLIGHT.dec();
                    });
                }
                _ = shutdown.changed() => {
                    info!("relay ingress stopped");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn handle(&self, payload: &str) {
        let envelope: RelayEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(%e, "Malformed relay envelope dropped");
                RELAY_EVENTS_TOTAL
                    .with_label_values(&["malformed", "dropped"])
                    .inc();
                return;
            }
        };

        // Our own fan-out comes back on the channel; local delivery already
        // happened on this node.
        if envelope.origin.as_deref() == Some(self.node_id.as_str()) {
            RELAY_EVENTS_TOTAL
                .with_label_values(&[envelope.event.as_str(), "self"])
                .inc();
            return;
        }

        if !is_allowed(&envelope.event) {
            debug!(event = %envelope.event, "relay event rejected by allowlist");
            RELAY_EVENTS_TOTAL
                .with_label_values(&[envelope.event.as_str(), "rejected"])
                .inc();
            return;
        }

        let started = Instant::now();
        let frame = envelope.frame();
        if let Some(conn_id) = envelope.conn_id.as_deref() {
            // Connection-targeted envelopes are a no-op on every node but
            // the one hosting that connection.
            self.sink.to_connection(conn_id, &frame).await;
        } else {
            match (envelope.user_id, envelope.room_id.as_deref()) {
                (Some(user_id), Some(room_id)) => {
                    self.sink.to_user_in_room(user_id, room_id, &frame).await;
                }
                (Some(user_id), None) => {
                    self.sink.to_user(user_id, &frame).await;
                }
                (None, Some(room_id)) => {
                    self.sink.to_room(room_id, &frame, None).await;
                }
                (None, None) => {
                    self.sink.to_all(&frame).await;
                }
            }
        }

        RELAY_EVENTS_TOTAL
            .with_label_values(&[envelope.event.as_str(), "delivered"])
            .inc();
        RELAY_DURATION_SECONDS
            .with_label_values(&[envelope.event.as_str()])
            .observe(started.elapsed().as_secs_f64());
    }
}
