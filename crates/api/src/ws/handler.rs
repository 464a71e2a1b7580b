use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use voxroom_services::Identity;
use voxroom_services::auth::AuthError;
use voxroom_services::metrics::WS_CONNECTIONS;

use super::storage::WsSender;
use crate::error::ErrorCode;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Per-connection context handed to every handler. Inbound messages of one
/// connection are processed in receipt order; different connections run
/// concurrently.
pub struct ConnContext {
    pub conn_id: String,
    pub identity: Identity,
    pub sender: WsSender,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let header_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let token = params.token.or(header_token);
    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());

    match state.auth.authenticate(token.as_deref(), origin).await {
        Ok(identity) => ws.on_upgrade(move |socket| handle_socket(socket, state, identity)),
        Err(e) => {
            let status = match e {
                AuthError::Required | AuthError::Invalid => 401,
                AuthError::OriginNotAllowed => 403,
                AuthError::Failed => 500,
            };
            Response::builder()
                .status(status)
                .body(ErrorCode::from(e).as_str().into())
                .unwrap_or_default()
        }
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, identity: Identity) {
    let conn_id = Uuid::new_v4().to_string();
    let user_id = identity.user_id;
    info!(user_id, %conn_id, "WebSocket connected");
    WS_CONNECTIONS.inc();

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));

    state.connections.add(&conn_id, identity.clone(), sender.clone());
    if let Err(e) = state.indexes.add_socket(user_id, &conn_id).await {
        warn!(user_id, %e, "Failed to register socket index");
    }

    {
        let hello = serde_json::json!({
            "event": "connected",
            "data": { "connId": conn_id, "userId": user_id },
        });
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::text(hello.to_string())).await;
    }

    let ctx = ConnContext {
        conn_id: conn_id.clone(),
        identity,
        sender: sender.clone(),
    };

    let mut shutdown = state.shutdown.clone();
    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        super::dispatcher::dispatch(&state, &ctx, &text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let mut guard = sender.lock().await;
                        let _ = guard.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(user_id, %conn_id, %e, "WebSocket error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = shutdown.changed() => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Close(None)).await;
                break;
            }
        }
    }

    // Destruction frees all owned resources: rooms, seats, media, indices.
    let joined_rooms = state.connections.remove(&conn_id);
    for room_id in joined_rooms {
        super::handlers::room::leave_cleanup(&state, &ctx, &room_id).await;
    }
    if let Err(e) = state.indexes.remove_socket(user_id, &conn_id).await {
        warn!(user_id, %e, "Failed to drop socket index");
    }

    WS_CONNECTIONS.dec();
    info!(user_id, %conn_id, "WebSocket disconnected");
}
