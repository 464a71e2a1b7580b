use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{BackendClient, BackendError, Role};

/// Positive-only caches over the backend's ownership and role lookups.
/// Owners are cached per room, roles per `(room, user)`; misses always go
/// back to the backend.
pub struct RoleCache {
    backend: Arc<BackendClient>,
    owners: DashMap<String, (i64, Instant)>,
    roles: DashMap<(String, i64), (Role, Instant)>,
    owner_ttl: Duration,
    role_ttl: Duration,
}

impl RoleCache {
    pub fn new(backend: Arc<BackendClient>, owner_ttl_secs: u64, role_ttl_secs: u64) -> Self {
        Self {
            backend,
            owners: DashMap::new(),
            roles: DashMap::new(),
            owner_ttl: Duration::from_secs(owner_ttl_secs),
            role_ttl: Duration::from_secs(role_ttl_secs),
        }
    }

    pub async fn owner_of(&self, room_id: &str) -> Result<Option<i64>, BackendError> {
        if let Some(entry) = self.owners.get(room_id) {
            let (owner, at) = *entry;
            if at.elapsed() < self.owner_ttl {
                return Ok(Some(owner));
            }
        }
        let owner = self.backend.room_owner(room_id).await?;
        if let Some(owner) = owner {
            self.owners
                .insert(room_id.to_string(), (owner, Instant::now()));
        }
        Ok(owner)
    }

    pub async fn role_of(&self, room_id: &str, user_id: i64) -> Result<Option<Role>, BackendError> {
        let key = (room_id.to_string(), user_id);
        if let Some(entry) = self.roles.get(&key) {
            let (role, at) = *entry;
            if at.elapsed() < self.role_ttl {
                return Ok(Some(role));
            }
        }
        let role = self.backend.member_role(room_id, user_id).await?;
        if let Some(role) = role {
            self.roles.insert(key, (role, Instant::now()));
            debug!(room_id, user_id, ?role, "role cached");
        }
        Ok(role)
    }

    pub async fn is_owner(&self, room_id: &str, user_id: i64) -> Result<bool, BackendError> {
        Ok(self.owner_of(room_id).await? == Some(user_id))
    }

    /// Owner or admin.
    pub async fn is_privileged(&self, room_id: &str, user_id: i64) -> Result<bool, BackendError> {
        if self.is_owner(room_id, user_id).await? {
            return Ok(true);
        }
        Ok(self
            .role_of(room_id, user_id)
            .await?
            .is_some_and(Role::is_privileged))
    }

    /// Drops cached entries for a room, e.g. on close.
    pub fn forget_room(&self, room_id: &str) {
        self.owners.remove(room_id);
        self.roles.retain(|(room, _), _| room != room_id);
    }
}
