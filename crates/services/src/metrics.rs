use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, register_histogram,
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
};

lazy_static! {
    pub static ref AUTH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "voxroom_auth_attempts_total",
        "Connection authentication attempts",
        &["outcome"] // "ok", "missing", "invalid", "revoked", "origin", "error"
    )
    .unwrap();
    pub static ref WS_CONNECTIONS: IntGauge =
        register_int_gauge!("voxroom_ws_connections", "Currently open WebSocket connections")
            .unwrap();
    pub static ref ROOMS_HOSTED: IntGauge =
        register_int_gauge!("voxroom_rooms_hosted", "Rooms whose SFU router lives on this node")
            .unwrap();
    pub static ref ROOM_PARTICIPANTS: IntGauge = register_int_gauge!(
        "voxroom_room_participants",
        "Connections currently joined to a room on this node"
    )
    .unwrap();
    pub static ref ROOMS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "voxroom_rooms_closed_total",
        "Rooms closed, by reason",
        &["reason"]
    )
    .unwrap();
    pub static ref HANDLER_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "voxroom_handler_duration_seconds",
        "Inbound event handler duration",
        &["event"]
    )
    .unwrap();
    pub static ref HANDLER_RESULTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "voxroom_handler_results_total",
        "Inbound event handler outcomes",
        &["event", "outcome"] // "ok" or the error code
    )
    .unwrap();
    pub static ref RELAY_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "voxroom_relay_events_total",
        "Pub/sub envelopes observed by the relay",
        &["event", "delivered"] // "delivered", "rejected", "dropped", "self"
    )
    .unwrap();
    pub static ref RELAY_IN_FLIGHT: IntGauge = register_int_gauge!(
        "voxroom_relay_in_flight",
        "Relay envelopes currently being routed"
    )
    .unwrap();
    pub static ref RELAY_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "voxroom_relay_duration_seconds",
        "Per-event relay routing duration",
        &["event"]
    )
    .unwrap();
    pub static ref GIFTS_ENQUEUED_TOTAL: IntCounter =
        register_int_counter!("voxroom_gifts_enqueued_total", "Gift transactions enqueued")
            .unwrap();
    pub static ref GIFT_BATCH_SIZE: Histogram = register_histogram!(
        "voxroom_gift_batch_size",
        "Transactions per gift settlement batch",
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    )
    .unwrap();
    pub static ref GIFT_DEAD_LETTER: IntGauge = register_int_gauge!(
        "voxroom_gift_dead_letter",
        "Gift transactions parked in the dead letter list"
    )
    .unwrap();
    pub static ref SEAT_OPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "voxroom_seat_ops_total",
        "Seat operations, by op and outcome",
        &["op", "outcome"]
    )
    .unwrap();
    pub static ref WORKER_RESTARTS_TOTAL: IntCounter = register_int_counter!(
        "voxroom_worker_restarts_total",
        "SFU workers re-created after death"
    )
    .unwrap();
}

/// Forces initialization so `/metrics` exposes every series from the start.
pub fn register_metrics() {
    let _ = AUTH_ATTEMPTS_TOTAL.with_label_values(&["ok"]).get();
    let _ = WS_CONNECTIONS.get();
    let _ = ROOMS_HOSTED.get();
    let _ = ROOM_PARTICIPANTS.get();
    let _ = ROOMS_CLOSED_TOTAL.with_label_values(&["inactivity"]).get();
    let _ = RELAY_EVENTS_TOTAL.with_label_values(&["none", "rejected"]).get();
    let _ = RELAY_IN_FLIGHT.get();
    let _ = GIFTS_ENQUEUED_TOTAL.get();
    let _ = GIFT_DEAD_LETTER.get();
    let _ = WORKER_RESTARTS_TOTAL.get();
}
