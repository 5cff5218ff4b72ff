/**
 * Room Membership Manager
 *
 * Tracks which chat rooms each live connection listens to. Broadcasts for a
 * chat go to `members_of(chat_id)` and nowhere else.
 *
 * Joining is not authorised here; the gateway only calls `join` for chats the
 * connection's user participates in.
 */

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use super::connection::ConnectionId;

#[derive(Debug, Default)]
struct Rooms {
    by_chat: HashMap<Uuid, HashSet<ConnectionId>>,
    by_connection: HashMap<ConnectionId, HashSet<Uuid>>,
}

#[derive(Debug, Default)]
pub struct RoomMembershipManager {
    rooms: Mutex<Rooms>,
}

impl RoomMembershipManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent. Returns `true` if the membership is new.
    pub fn join(&self, connection_id: ConnectionId, chat_id: Uuid) -> bool {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .by_connection
            .entry(connection_id)
            .or_default()
            .insert(chat_id);
        rooms.by_chat.entry(chat_id).or_default().insert(connection_id)
    }

    /// Idempotent. Returns `true` if a membership was removed.
    pub fn leave(&self, connection_id: ConnectionId, chat_id: Uuid) -> bool {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let removed = match rooms.by_chat.get_mut(&chat_id) {
            Some(members) => {
                let removed = members.remove(&connection_id);
                if members.is_empty() {
                    rooms.by_chat.remove(&chat_id);
                }
                removed
            }
            None => false,
        };
        if let Some(chats) = rooms.by_connection.get_mut(&connection_id) {
            chats.remove(&chat_id);
            if chats.is_empty() {
                rooms.by_connection.remove(&connection_id);
            }
        }
        removed
    }

    /// Drop every membership of `connection_id`, returning the chats it was in
    pub fn leave_all(&self, connection_id: ConnectionId) -> BTreeSet<Uuid> {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        let chats = rooms
            .by_connection
            .remove(&connection_id)
            .unwrap_or_default();
        for chat_id in &chats {
            if let Some(members) = rooms.by_chat.get_mut(chat_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    rooms.by_chat.remove(chat_id);
                }
            }
        }
        if !chats.is_empty() {
            tracing::debug!("[Rooms] {} left {} rooms", connection_id, chats.len());
        }
        chats.into_iter().collect()
    }

    pub fn members_of(&self, chat_id: Uuid) -> HashSet<ConnectionId> {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.by_chat.get(&chat_id).cloned().unwrap_or_default()
    }

    pub fn is_member(&self, connection_id: ConnectionId, chat_id: Uuid) -> bool {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .by_chat
            .get(&chat_id)
            .is_some_and(|members| members.contains(&connection_id))
    }

    pub fn rooms_of(&self, connection_id: ConnectionId) -> BTreeSet<Uuid> {
        let rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .by_connection
            .get(&connection_id)
            .map(|chats| chats.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms.by_chat.clear();
        rooms.by_connection.clear();
    }
}
