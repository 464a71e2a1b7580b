use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use voxroom_config::BackendSettings;
use voxroom_store::gifts::GiftTransaction;

const INTERNAL_KEY_HEADER: &str = "x-internal-key";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status: {0}")]
    Status(StatusCode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Serialize)]
pub struct RoomStatusUpdate {
    pub live: bool,
    pub participant_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchItem<'a> {
    transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_id: Option<&'a str>,
    sender_id: i64,
    recipient_id: i64,
    gift_id: i64,
    quantity: u32,
    timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub struct BatchFailure {
    #[serde(rename = "transactionId")]
    pub transaction_id: Uuid,
    pub code: serde_json::Value,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    pub processed_count: u32,
    #[serde(default)]
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Deserialize)]
struct RoomInfo {
    owner_id: i64,
}

#[derive(Debug, Deserialize)]
struct RoleResponse {
    role: Role,
}

/// HTTP collaborator for gift settlement, room status, and ownership/role
/// lookups. Every request carries the internal key and a 10 s deadline.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    internal_key: String,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            internal_key: settings.internal_key.clone(),
        })
    }

    /// Settles a gift batch in one call.
    pub async fn gift_batch(
        &self,
        transactions: &[GiftTransaction],
    ) -> Result<BatchResponse, BackendError> {
        let items: Vec<BatchItem> = transactions
            .iter()
            .map(|tx| BatchItem {
                transaction_id: tx.transaction_id,
                room_id: Some(tx.room_id.as_str()),
                sender_id: tx.sender_id,
                recipient_id: tx.recipient_id,
                gift_id: tx.gift_id,
                quantity: tx.quantity,
                timestamp: tx.ts,
            })
            .collect();

        let resp = self
            .http
            .post(format!("{}/internal/gifts/batch", self.base_url))
            .header(INTERNAL_KEY_HEADER, &self.internal_key)
            .json(&serde_json::json!({ "transactions": items }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status()));
        }
        Ok(resp.json().await?)
    }

    /// Room liveness updates; callers treat failures as fire-and-forget.
    pub async fn room_status(
        &self,
        room_id: &str,
        update: &RoomStatusUpdate,
    ) -> Result<(), BackendError> {
        let resp = self
            .http
            .post(format!("{}/internal/rooms/{room_id}/status", self.base_url))
            .header(INTERNAL_KEY_HEADER, &self.internal_key)
            .json(update)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status()));
        }
        debug!(room_id, live = update.live, "room status reported");
        Ok(())
    }

    /// Room ownership; `None` when the backend does not know the room.
    pub async fn room_owner(&self, room_id: &str) -> Result<Option<i64>, BackendError> {
        let resp = self
            .http
            .get(format!("{}/internal/rooms/{room_id}", self.base_url))
            .header(INTERNAL_KEY_HEADER, &self.internal_key)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let info: RoomInfo = resp.json().await?;
                Ok(Some(info.owner_id))
            }
            status => Err(BackendError::Status(status)),
        }
    }

    /// Membership role; `None` when the user has no role in the room.
    pub async fn member_role(
        &self,
        room_id: &str,
        user_id: i64,
    ) -> Result<Option<Role>, BackendError> {
        let resp = self
            .http
            .get(format!(
                "{}/internal/rooms/{room_id}/members/{user_id}/role",
                self.base_url
            ))
            .header(INTERNAL_KEY_HEADER, &self.internal_key)
            .send()
            .await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: RoleResponse = resp.json().await?;
                Ok(Some(body.role))
            }
            status => Err(BackendError::Status(status)),
        }
    }
}
