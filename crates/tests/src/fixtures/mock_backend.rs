use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;
use tokio::net::TcpListener;

/// Stand-in for the business backend: ownership/role lookups, room status
/// sink, and the gift settlement endpoint.
#[derive(Clone)]
pub struct MockBackend {
    pub base_url: String,
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

struct MockState {
    owner_id: AtomicI64,
    fail_gifts: AtomicBool,
    admins: Mutex<HashSet<i64>>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState {
            owner_id: AtomicI64::new(1),
            fail_gifts: AtomicBool::new(false),
            admins: Mutex::new(HashSet::new()),
        });

        let app = Router::new()
            .route("/internal/rooms/{room_id}", get(room_info))
            .route(
                "/internal/rooms/{room_id}/members/{user_id}/role",
                get(member_role),
            )
            .route("/internal/rooms/{room_id}/status", post(room_status))
            .route("/internal/gifts/batch", post(gift_batch))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            addr,
            state,
        }
    }

    /// The user id reported as room owner for every room.
    pub fn set_owner(&self, user_id: i64) {
        self.state.owner_id.store(user_id, Ordering::Relaxed);
    }

    pub fn add_admin(&self, user_id: i64) {
        self.state.admins.lock().unwrap().insert(user_id);
    }

    /// When set, every gift in a batch is reported failed with code 4002.
    pub fn fail_gifts(&self, fail: bool) {
        self.state.fail_gifts.store(fail, Ordering::Relaxed);
    }
}

async fn room_info(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({ "owner_id": state.owner_id.load(Ordering::Relaxed) }))
}

async fn member_role(
    State(state): State<Arc<MockState>>,
    Path((_room_id, user_id)): Path<(String, i64)>,
) -> Json<Value> {
    let role = if user_id == state.owner_id.load(Ordering::Relaxed) {
        "owner"
    } else if state.admins.lock().unwrap().contains(&user_id) {
        "admin"
    } else {
        "member"
    };
    Json(json!({ "role": role }))
}

async fn room_status() -> Json<Value> {
    Json(json!({}))
}

async fn gift_batch(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    let transactions = body["transactions"].as_array().cloned().unwrap_or_default();
    if state.fail_gifts.load(Ordering::Relaxed) {
        let failed: Vec<Value> = transactions
            .iter()
            .map(|tx| {
                json!({
                    "transactionId": tx["transactionId"],
                    "code": 4002,
                    "reason": "insufficient",
                })
            })
            .collect();
        Json(json!({ "processed_count": 0, "failed": failed }))
    } else {
        Json(json!({ "processed_count": transactions.len(), "failed": [] }))
    }
}
