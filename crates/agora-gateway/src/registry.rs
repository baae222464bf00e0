use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use agora_types::UserId;
use uuid::Uuid;

/// Which users are online, and through which live connections.
///
/// A user is online iff they have at least one live connection handle. Every
/// mutation happens under the write lock, so readers never see an empty
/// per-user set or a user id twice.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    online: RwLock<HashMap<UserId, HashSet<Uuid>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the handle was already registered (no-op).
    pub fn add(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let mut online = self.online.write().unwrap_or_else(PoisonError::into_inner);
        online.entry(user_id).or_default().insert(conn_id)
    }

    /// Returns false if the handle was not registered. Drops the user entirely
    /// once their last handle is gone.
    pub fn remove(&self, user_id: UserId, conn_id: Uuid) -> bool {
        let mut online = self.online.write().unwrap_or_else(PoisonError::into_inner);
        let Some(handles) = online.get_mut(&user_id) else {
            return false;
        };
        let removed = handles.remove(&conn_id);
        if handles.is_empty() {
            online.remove(&user_id);
        }
        removed
    }

    /// Sorted ascending.
    pub fn online_user_ids(&self) -> Vec<UserId> {
        let online = self.online.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<UserId> = online.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&user_id)
    }

    pub fn connection_count(&self, user_id: UserId) -> usize {
        self.online
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map_or(0, HashSet::len)
    }
}
