/**
 * Realtime Gateway
 *
 * The gateway owns every live connection and drives its lifecycle:
 *
 * ```text
 * Connecting --authenticate--> Active --disconnect--> Closed
 *      \--bad token--> Rejected (no state created)
 * ```
 *
 * While `Active`, a connection's commands are authorised against the chat
 * store, persisted through it, and fanned out to the chat's room.
 *
 * # Ordering
 *
 * Each chat has a sequencer held from the start of `append_message` until
 * the resulting `newMessage` is queued on every room member, so room
 * members see messages in append order. Different chats never share a
 * sequencer.
 *
 * # Bounded store calls
 *
 * Every call into the store or identity provider runs under
 * `store_timeout`; expiry surfaces as `StoreUnavailable` to the caller.
 *
 * # Slow consumers
 *
 * Outbound queues hold at most `queue_capacity` events. A connection whose
 * queue is full when an event is fanned out is disconnected; the client
 * reconnects and refetches what it missed.
 *
 * # Presence
 *
 * Presence transitions of one user, and the announcements they trigger,
 * are serialised, so observers see `userOnline`/`userOffline` in the order
 * the transitions happened.
 */

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::broadcast::fan_out;
use super::connection::{
    ConnectionHandle, ConnectionId, ConnectionIdGenerator, Delivery, EventReceiver,
    DEFAULT_QUEUE_CAPACITY,
};
use super::presence::PresenceTracker;
use super::rooms::RoomMembershipManager;
use super::turns::KeyedTurns;
use crate::backend::auth::{IdentityProvider, UserIdentity};
use crate::backend::chat::ChatStore;
use crate::backend::error::{ChatError, ChatResult};
use crate::shared::{ClientCommand, MessageType, ServerEvent};

/// Default budget for one store or identity round-trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated, `Active` connection as seen by its transport
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: UserIdentity,
    /// Events to write to the client; ends when the gateway drops the connection
    pub events: EventReceiver,
}

pub struct RealtimeGateway {
    store: Arc<dyn ChatStore>,
    identity: Arc<dyn IdentityProvider>,
    presence: PresenceTracker,
    rooms: RoomMembershipManager,
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    ids: ConnectionIdGenerator,
    sequencers: KeyedTurns<Uuid>,
    presence_turns: KeyedTurns<Uuid>,
    store_timeout: Duration,
    queue_capacity: usize,
    closed: AtomicBool,
}

impl RealtimeGateway {
    pub fn new(store: Arc<dyn ChatStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identity,
            presence: PresenceTracker::new(),
            rooms: RoomMembershipManager::new(),
            connections: RwLock::new(HashMap::new()),
            ids: ConnectionIdGenerator::default(),
            sequencers: KeyedTurns::new(),
            presence_turns: KeyedTurns::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Outbound events a connection may have queued before it is dropped
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn rooms(&self) -> &RoomMembershipManager {
        &self.rooms
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn identity(&self) -> &Arc<dyn IdentityProvider> {
        &self.identity
    }

    pub fn connection_count(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&connection_id)
    }

    /// Validate `token` without creating any state
    pub async fn authenticate(&self, token: &str) -> ChatResult<UserIdentity> {
        self.bounded(self.identity.authenticate(token)).await
    }

    /// Authenticate `token` and bring a new connection to `Active`.
    ///
    /// On failure nothing is registered (`Rejected`). On the user's first
    /// connection, `userOnline` goes to every online user sharing a chat.
    pub async fn connect(&self, token: &str) -> ChatResult<Connection> {
        let user = self.authenticate(token).await?;
        self.attach(user).await
    }

    /// Bring an already-authenticated user to `Active`
    pub async fn attach(&self, user: UserIdentity) -> ChatResult<Connection> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ChatError::store_unavailable("gateway is shutting down"));
        }

        let (sender, events) = mpsc::channel(self.queue_capacity);
        let id = self.ids.next_id();
        let handle = ConnectionHandle::new(id, user.clone(), sender);
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle);

        tracing::info!("[Gateway] {} connected as {} ({})", id, user.username, user.id);

        let lagging = {
            let _turn = self.presence_turns.acquire(user.id).await;
            if self.presence.connect(user.id, id) {
                self.announce_presence(user.id, ServerEvent::UserOnline { user_id: user.id })
                    .await
            } else {
                Vec::new()
            }
        };
        self.evict(lagging).await;

        Ok(Connection { id, user, events })
    }

    /// Finalize a connection: leave every room, drop presence, and announce
    /// `userOffline` if it was the user's last connection.
    ///
    /// Safe to call any number of times; only the first call has effects.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let Some(mut pending) = self.finalize(connection_id).await else {
            return false;
        };
        // connections that lagged on the offline announcement go the same way
        while let Some(lagging) = pending.pop() {
            if let Some(more) = self.finalize(lagging).await {
                pending.extend(more);
            }
        }
        true
    }

    /// Handle one command and report any failure to the issuing connection
    /// as an `error` event.
    pub async fn process(&self, connection_id: ConnectionId, command: ClientCommand) {
        let name = command.name();
        if let Err(err) = self.handle_command(connection_id, command).await {
            tracing::warn!("[Gateway] {} failed for {}: {}", name, connection_id, err);
            self.send_to(connection_id, err.to_event(Some(name)));
        }
    }

    pub async fn handle_command(
        &self,
        connection_id: ConnectionId,
        command: ClientCommand,
    ) -> ChatResult<()> {
        let handle = self.handle(connection_id)?;

        match command {
            ClientCommand::JoinChats { chat_ids } => self.join_chats(&handle, &chat_ids).await,
            ClientCommand::JoinChat { chat_id } => self.join_chats(&handle, &[chat_id]).await,
            ClientCommand::LeaveChat { chat_id } => {
                self.rooms.leave(connection_id, chat_id);
                Ok(())
            }
            ClientCommand::SendMessage {
                chat_id,
                content,
                message_type,
            } => {
                self.send_message(&handle, chat_id, &content, message_type)
                    .await
            }
            ClientCommand::Typing { chat_id, is_typing } => {
                self.relay_typing(&handle, chat_id, is_typing).await;
                Ok(())
            }
            ClientCommand::GetOnlineUsers => self.online_contacts(&handle).await,
        }
    }

    /// Close every live connection and clear presence and rooms
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<ConnectionHandle> = self
            .connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        self.rooms.clear();
        self.presence.clear();
        self.sequencers.clear();
        self.presence_turns.clear();
        tracing::info!("[Gateway] Shut down, closed {} connections", drained.len());
    }

    /// Queue an event for one connection, if it is still active
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) {
        if let Ok(handle) = self.handle(connection_id) {
            if handle.send(event) == Delivery::Full {
                tracing::warn!("[Gateway] Queue of {} is full, reply dropped", connection_id);
            }
        }
    }

    /// Unregister one connection and clean up after it. Returns `None` when
    /// it was not registered, otherwise the connections that lagged on the
    /// `userOffline` announcement.
    async fn finalize(&self, connection_id: ConnectionId) -> Option<Vec<ConnectionId>> {
        let handle = self
            .connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&connection_id)?;

        self.rooms.leave_all(connection_id);
        let user_id = handle.user.id;
        tracing::info!("[Gateway] {} disconnected ({})", connection_id, user_id);

        let _turn = self.presence_turns.acquire(user_id).await;
        if self.presence.disconnect(user_id, connection_id) {
            Some(
                self.announce_presence(user_id, ServerEvent::UserOffline { user_id })
                    .await,
            )
        } else {
            Some(Vec::new())
        }
    }

    /// Authorised joins succeed independently; chats the user cannot see are
    /// skipped without an error. Store failures are reported after the batch.
    async fn join_chats(&self, handle: &ConnectionHandle, chat_ids: &[Uuid]) -> ChatResult<()> {
        let mut failure = None;
        for chat_id in chat_ids {
            match self.bounded(self.store.get_chat(*chat_id)).await {
                Ok(chat) if chat.has_participant(handle.user.id) => {
                    if !self.join_if_active(handle.id, *chat_id) {
                        tracing::debug!("[Gateway] {} closed while joining", handle.id);
                        return Ok(());
                    }
                    tracing::debug!("[Gateway] {} joined chat {}", handle.id, chat_id);
                }
                Ok(_) | Err(ChatError::NotFound { .. }) | Err(ChatError::Forbidden { .. }) => {
                    tracing::debug!(
                        "[Gateway] {} may not join chat {}, skipped",
                        handle.id,
                        chat_id
                    );
                }
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Join under the registry read guard. `finalize` and `shutdown` remove
    /// the connection under the write guard before clearing its rooms, so a
    /// membership is never added for a connection that is already gone.
    fn join_if_active(&self, connection_id: ConnectionId, chat_id: Uuid) -> bool {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        if !connections.contains_key(&connection_id) {
            return false;
        }
        self.rooms.join(connection_id, chat_id);
        true
    }

    async fn send_message(
        &self,
        handle: &ConnectionHandle,
        chat_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> ChatResult<()> {
        let (turn, outcome) = self
            .bounded(async {
                let turn = self.sequencers.acquire(chat_id).await;
                self.store
                    .append_message(chat_id, handle.user.id, content, message_type)
                    .await
                    .map(|outcome| (turn, outcome))
            })
            .await?;

        let event = ServerEvent::NewMessage {
            chat_id,
            message: outcome.message,
            chat: outcome.chat,
        };
        let targets = self.handles_for(self.rooms.members_of(chat_id));
        let delivery = fan_out(&targets, &event);
        drop(turn);

        self.evict(delivery.lagging).await;
        Ok(())
    }

    /// Typing is relayed only to the chat's room, and only from a connection
    /// that is in that room itself.
    async fn relay_typing(&self, handle: &ConnectionHandle, chat_id: Uuid, is_typing: bool) {
        if !self.rooms.is_member(handle.id, chat_id) {
            tracing::debug!(
                "[Gateway] Ignoring typing from {} outside chat {}",
                handle.id,
                chat_id
            );
            return;
        }

        let event = ServerEvent::UserTyping {
            user_id: handle.user.id,
            username: handle.user.username.clone(),
            chat_id,
            is_typing,
        };
        let mut members = self.rooms.members_of(chat_id);
        members.remove(&handle.id);
        let targets = self.handles_for(members);
        let delivery = fan_out(&targets, &event);
        self.evict(delivery.lagging).await;
    }

    async fn online_contacts(&self, handle: &ConnectionHandle) -> ChatResult<()> {
        let contacts = self
            .bounded(self.store.shared_contacts(handle.user.id))
            .await?;
        let user_ids = contacts
            .into_iter()
            .filter(|contact| self.presence.is_online(*contact))
            .collect();
        let delivery = fan_out([handle], &ServerEvent::OnlineUsers { user_ids });
        self.evict(delivery.lagging).await;
        Ok(())
    }

    /// Send a presence change to every connection of every user who shares a
    /// chat with `user_id`, returning the connections that lagged. Presence
    /// is best effort: a store failure here is logged and the announcement
    /// dropped.
    async fn announce_presence(&self, user_id: Uuid, event: ServerEvent) -> Vec<ConnectionId> {
        let contacts = match self.bounded(self.store.shared_contacts(user_id)).await {
            Ok(contacts) => contacts,
            Err(err) => {
                tracing::warn!(
                    "[Gateway] Could not resolve presence audience for {}: {}",
                    user_id,
                    err
                );
                return Vec::new();
            }
        };

        let targets = self.handles_for(self.audience(&contacts));
        fan_out(&targets, &event).lagging
    }

    /// Disconnect slow consumers
    async fn evict(&self, lagging: Vec<ConnectionId>) {
        for connection_id in lagging {
            tracing::warn!("[Gateway] Disconnecting slow consumer {}", connection_id);
            self.disconnect(connection_id).await;
        }
    }

    fn audience(&self, contacts: &BTreeSet<Uuid>) -> Vec<ConnectionId> {
        contacts
            .iter()
            .flat_map(|contact| self.presence.connections_of(*contact))
            .collect()
    }

    fn handle(&self, connection_id: ConnectionId) -> ChatResult<ConnectionHandle> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&connection_id)
            .cloned()
            .ok_or_else(|| ChatError::unauthorized("connection is not active"))
    }

    fn handles_for(&self, ids: impl IntoIterator<Item = ConnectionId>) -> Vec<ConnectionHandle> {
        let connections = self.connections.read().unwrap_or_else(|e| e.into_inner());
        ids.into_iter()
            .filter_map(|id| connections.get(&id).cloned())
            .collect()
    }

    async fn bounded<T>(&self, call: impl Future<Output = ChatResult<T>>) -> ChatResult<T> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::store_unavailable(format!(
                "no response within {}ms",
                self.store_timeout.as_millis()
            ))),
        }
    }
}
