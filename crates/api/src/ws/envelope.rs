use axum::extract::ws::Message;
use futures::SinkExt;
use nanoid::nanoid;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error};
use validator::Validate;
use voxroom_services::metrics::{HANDLER_DURATION_SECONDS, HANDLER_RESULTS_TOTAL};

use super::storage::WsSender;
use crate::error::ErrorCode;

/// Uniform validate-then-execute wrapper around every inbound request:
/// correlation id, duration metric, schema validation, and the
/// `{ok,data}` / `{ok:false,err}` acknowledgement.
pub async fn handle<P, F, Fut>(
    event: &'static str,
    data: Value,
    ack: Option<u64>,
    sender: &WsSender,
    f: F,
) where
    P: DeserializeOwned + Validate,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = Result<Value, ErrorCode>>,
{
    let correlation_id = nanoid!(12);
    let started = Instant::now();

    let result = match serde_json::from_value::<P>(data) {
        Ok(payload) => match payload.validate() {
            Ok(()) => f(payload).await,
            Err(e) => {
                debug!(event, %correlation_id, %e, "payload validation failed");
                Err(ErrorCode::InvalidPayload)
            }
        },
        Err(e) => {
            debug!(event, %correlation_id, %e, "payload deserialization failed");
            Err(ErrorCode::InvalidPayload)
        }
    };

    HANDLER_DURATION_SECONDS
        .with_label_values(&[event])
        .observe(started.elapsed().as_secs_f64());
    let outcome = match &result {
        Ok(_) => "ok",
        Err(code) => code.as_str(),
    };
    HANDLER_RESULTS_TOTAL
        .with_label_values(&[event, outcome])
        .inc();

    if let Err(ErrorCode::Internal) = &result {
        error!(event, %correlation_id, "handler failed internally");
    }

    let Some(ack_id) = ack else {
        return;
    };
    let ack_frame = match result {
        Ok(data) if data.is_null() => serde_json::json!({ "ack": ack_id, "ok": true }),
        Ok(data) => serde_json::json!({ "ack": ack_id, "ok": true, "data": data }),
        Err(code) => serde_json::json!({ "ack": ack_id, "ok": false, "err": code }),
    };

    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::text(ack_frame.to_string())).await {
        debug!(event, %correlation_id, %e, "failed to deliver ack");
    }
}
