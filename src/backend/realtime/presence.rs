/**
 * Presence Tracker
 *
 * In-memory bookkeeping of which users are reachable. A user is online while
 * they hold at least one live connection. Nothing is persisted: after a
 * restart everybody is offline until they reconnect.
 */

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::connection::ConnectionId;

#[derive(Debug, Default)]
pub struct PresenceTracker {
    connections: Mutex<HashMap<Uuid, HashSet<ConnectionId>>>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection_id` for `user_id`.
    ///
    /// # Returns
    ///
    /// `true` when this was the user's first connection (offline -> online)
    pub fn connect(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let set = connections.entry(user_id).or_default();
        let was_offline = set.is_empty();
        set.insert(connection_id);
        if was_offline {
            tracing::debug!("[Presence] {} is online ({})", user_id, connection_id);
        }
        was_offline
    }

    /// Remove `connection_id` from `user_id`.
    ///
    /// # Returns
    ///
    /// `true` only when this removed the user's last connection
    /// (online -> offline). Unknown pairs return `false`.
    pub fn disconnect(&self, user_id: Uuid, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        let Some(set) = connections.get_mut(&user_id) else {
            return false;
        };
        if !set.remove(&connection_id) {
            return false;
        }
        if set.is_empty() {
            connections.remove(&user_id);
            tracing::debug!("[Presence] {} is offline", user_id);
            return true;
        }
        false
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.get(&user_id).is_some_and(|set| !set.is_empty())
    }

    pub fn online_users(&self) -> BTreeSet<Uuid> {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.keys().copied().collect()
    }

    pub fn connections_of(&self, user_id: Uuid) -> HashSet<ConnectionId> {
        let connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        connections.get(&user_id).cloned().unwrap_or_default()
    }

    pub fn clear(&self) {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
