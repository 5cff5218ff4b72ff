//! Realtime gateway scenarios, driven in-process without a socket

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use failfixes_chat::backend::auth::MemoryUserDirectory;
use failfixes_chat::backend::chat::{AppendOutcome, ChatStore, MemoryChatStore};
use failfixes_chat::backend::error::ChatResult;
use failfixes_chat::shared::{
    Chat, ClientCommand, ErrorCode, Message, MessageType, Pagination, ServerEvent,
};

use crate::common::{assert_no_event, drain, next_event, test_config, TestContext};

fn send(chat_id: Uuid, content: &str) -> ClientCommand {
    ClientCommand::SendMessage {
        chat_id,
        content: content.to_string(),
        message_type: MessageType::Text,
    }
}

#[tokio::test]
async fn test_direct_chat_message_and_read_flow() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);

    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();
    assert_eq!(chat.participants, BTreeSet::from([a.id(), b.id()]));
    assert_eq!(chat.unread_count(a.id()), 0);
    assert_eq!(chat.unread_count(b.id()), 0);

    let conn = ctx.connect(&a).await;
    ctx.gateway()
        .handle_command(conn.id, send(chat.id, "hello"))
        .await
        .unwrap();

    let chat = ctx.store().get_chat(chat.id).await.unwrap();
    assert_eq!(chat.last_message.as_ref().unwrap().content, "hello");
    assert_eq!(chat.unread_count(a.id()), 0);
    assert_eq!(chat.unread_count(b.id()), 1);

    let chat = ctx.store().mark_read(chat.id, b.id()).await.unwrap();
    assert_eq!(chat.unread_count(b.id()), 0);
}

#[tokio::test]
async fn test_new_message_reaches_only_joined_connections() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut c1 = ctx.connect(&a).await;
    let mut c2 = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    drain(&mut c1);
    drain(&mut c2);

    ctx.gateway()
        .handle_command(c1.id, ClientCommand::JoinChats { chat_ids: vec![chat.id] })
        .await
        .unwrap();

    // bob never joined the room on this connection
    ctx.gateway()
        .handle_command(b_conn.id, send(chat.id, "hi alice"))
        .await
        .unwrap();

    let event = next_event(&mut c1).await;
    assert_matches!(
        event,
        ServerEvent::NewMessage { chat_id, ref message, chat: ref snapshot }
            if chat_id == chat.id
                && message.content == "hi alice"
                && message.sender == b.id()
                && snapshot.unread_count(a.id()) == 1
    );
    assert_no_event(&mut c2);
    assert_no_event(&mut b_conn);

    let listed = ctx.store().get_chats_for_user(a.id()).await.unwrap();
    assert_eq!(listed[0].unread_count(a.id()), 1);
}

#[tokio::test]
async fn test_presence_online_and_offline_announcements() {
    let ctx = TestContext::new();
    let (a, b, c) = (
        ctx.user("alice").await,
        ctx.user("bob").await,
        ctx.user("carol").await,
    );
    ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let mut c_conn = ctx.connect(&c).await;

    let mut b1 = ctx.connect(&b).await;
    assert_eq!(
        next_event(&mut a_conn).await,
        ServerEvent::UserOnline { user_id: b.id() }
    );
    assert_no_event(&mut c_conn);
    assert_no_event(&mut b1);

    // second connection: already online
    let b2 = ctx.connect(&b).await;
    assert_no_event(&mut a_conn);

    assert!(ctx.gateway().disconnect(b1.id).await);
    assert_no_event(&mut a_conn);
    assert!(ctx.gateway().presence().is_online(b.id()));

    assert!(ctx.gateway().disconnect(b2.id).await);
    assert_eq!(
        next_event(&mut a_conn).await,
        ServerEvent::UserOffline { user_id: b.id() }
    );
    assert!(!ctx.gateway().presence().is_online(b.id()));
    assert_no_event(&mut c_conn);
}

#[tokio::test]
async fn test_disconnect_twice_announces_once() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let b_conn = ctx.connect(&b).await;
    drain(&mut a_conn);

    assert!(ctx.gateway().disconnect(b_conn.id).await);
    assert!(!ctx.gateway().disconnect(b_conn.id).await);

    assert_eq!(drain(&mut a_conn), vec![ServerEvent::UserOffline { user_id: b.id() }]);
}

#[tokio::test]
async fn test_typing_excludes_sender_connection() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    for conn in [&a_conn, &b_conn] {
        ctx.gateway()
            .handle_command(conn.id, ClientCommand::JoinChat { chat_id: chat.id })
            .await
            .unwrap();
    }
    drain(&mut a_conn);
    drain(&mut b_conn);

    ctx.gateway()
        .handle_command(
            a_conn.id,
            ClientCommand::Typing {
                chat_id: chat.id,
                is_typing: true,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        next_event(&mut b_conn).await,
        ServerEvent::UserTyping {
            user_id: a.id(),
            username: a.identity.username.clone(),
            chat_id: chat.id,
            is_typing: true,
        }
    );
    assert_no_event(&mut a_conn);
}

#[tokio::test]
async fn test_typing_outside_room_is_ignored() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let a_conn = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    ctx.gateway()
        .handle_command(b_conn.id, ClientCommand::JoinChat { chat_id: chat.id })
        .await
        .unwrap();
    drain(&mut b_conn);

    ctx.gateway()
        .handle_command(
            a_conn.id,
            ClientCommand::Typing {
                chat_id: chat.id,
                is_typing: true,
            },
        )
        .await
        .unwrap();
    assert_no_event(&mut b_conn);
}

#[tokio::test]
async fn test_unauthorized_joins_are_skipped_silently() {
    let ctx = TestContext::new();
    let (a, b, c) = (
        ctx.user("alice").await,
        ctx.user("bob").await,
        ctx.user("carol").await,
    );
    let private = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();
    let shared = ctx.store().create_direct_chat(a.id(), c.id()).await.unwrap();

    let mut c_conn = ctx.connect(&c).await;
    drain(&mut c_conn);

    ctx.gateway()
        .process(
            c_conn.id,
            ClientCommand::JoinChats {
                chat_ids: vec![private.id, Uuid::new_v4(), shared.id],
            },
        )
        .await;

    assert_no_event(&mut c_conn);
    let rooms = ctx.gateway().rooms();
    assert!(!rooms.is_member(c_conn.id, private.id));
    assert!(rooms.is_member(c_conn.id, shared.id));
}

#[tokio::test]
async fn test_forbidden_send_reports_error_and_changes_nothing() {
    let ctx = TestContext::new();
    let (a, b, c) = (
        ctx.user("alice").await,
        ctx.user("bob").await,
        ctx.user("carol").await,
    );
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    ctx.gateway()
        .handle_command(a_conn.id, ClientCommand::JoinChat { chat_id: chat.id })
        .await
        .unwrap();
    let mut c_conn = ctx.connect(&c).await;
    drain(&mut a_conn);

    ctx.gateway()
        .process(c_conn.id, send(chat.id, "let me in"))
        .await;

    assert_matches!(
        next_event(&mut c_conn).await,
        ServerEvent::Error { code: ErrorCode::Forbidden, command: Some(ref name), .. }
            if name == "sendMessage"
    );
    assert_no_event(&mut a_conn);

    let after = ctx.store().get_chat(chat.id).await.unwrap();
    assert_eq!(after, chat);
    let history = ctx
        .store()
        .get_messages(chat.id, a.id(), Pagination::default())
        .await
        .unwrap();
    assert!(history.is_empty());
}

#[tokio::test]
async fn test_invalid_content_goes_to_sender_only() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    for conn in [&a_conn, &b_conn] {
        ctx.gateway()
            .handle_command(conn.id, ClientCommand::JoinChat { chat_id: chat.id })
            .await
            .unwrap();
    }
    drain(&mut a_conn);
    drain(&mut b_conn);

    ctx.gateway().process(a_conn.id, send(chat.id, "   ")).await;

    assert_matches!(
        next_event(&mut a_conn).await,
        ServerEvent::Error {
            code: ErrorCode::InvalidContent,
            ..
        }
    );
    assert_no_event(&mut b_conn);
}

#[tokio::test]
async fn test_leave_chat_stops_delivery() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let b_conn = ctx.connect(&b).await;
    let gateway = ctx.gateway();
    gateway
        .handle_command(a_conn.id, ClientCommand::JoinChat { chat_id: chat.id })
        .await
        .unwrap();
    gateway
        .handle_command(a_conn.id, ClientCommand::LeaveChat { chat_id: chat.id })
        .await
        .unwrap();
    drain(&mut a_conn);

    gateway
        .handle_command(b_conn.id, send(chat.id, "anyone?"))
        .await
        .unwrap();
    assert_no_event(&mut a_conn);
}

#[tokio::test]
async fn test_disconnect_clears_rooms() {
    let ctx = TestContext::new();
    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let a_conn = ctx.connect(&a).await;
    ctx.gateway()
        .handle_command(a_conn.id, ClientCommand::JoinChat { chat_id: chat.id })
        .await
        .unwrap();
    assert!(ctx.gateway().rooms().is_member(a_conn.id, chat.id));

    ctx.gateway().disconnect(a_conn.id).await;
    assert!(ctx.gateway().rooms().members_of(chat.id).is_empty());
    assert!(ctx.gateway().presence().online_users().is_empty());
}

#[tokio::test]
async fn test_get_online_users_is_scoped_to_contacts() {
    let ctx = TestContext::new();
    let (a, b, c) = (
        ctx.user("alice").await,
        ctx.user("bob").await,
        ctx.user("carol").await,
    );
    ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();

    let mut a_conn = ctx.connect(&a).await;
    let _b_conn = ctx.connect(&b).await;
    let _c_conn = ctx.connect(&c).await;
    drain(&mut a_conn);

    ctx.gateway()
        .handle_command(a_conn.id, ClientCommand::GetOnlineUsers)
        .await
        .unwrap();
    assert_eq!(
        next_event(&mut a_conn).await,
        ServerEvent::OnlineUsers {
            user_ids: vec![b.id()]
        }
    );
}

#[tokio::test]
async fn test_room_sees_messages_in_append_order() {
    let ctx = TestContext::new();
    let (a, b, observer) = (
        ctx.user("alice").await,
        ctx.user("bob").await,
        ctx.user("olga").await,
    );
    let chat = ctx
        .store()
        .create_group_chat(a.id(), "crew", &[b.id(), observer.id()])
        .await
        .unwrap();

    let mut watching = ctx.connect(&observer).await;
    ctx.gateway()
        .handle_command(watching.id, ClientCommand::JoinChat { chat_id: chat.id })
        .await
        .unwrap();
    let a_conn = ctx.connect(&a).await;
    let b_conn = ctx.connect(&b).await;
    drain(&mut watching);

    let mut tasks = Vec::new();
    for conn_id in [a_conn.id, b_conn.id] {
        let gateway = ctx.gateway().clone();
        let chat_id = chat.id;
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                gateway
                    .handle_command(conn_id, send(chat_id, &format!("msg {}", i)))
                    .await
                    .unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let mut sequences = Vec::new();
    for _ in 0..20 {
        match next_event(&mut watching).await {
            ServerEvent::NewMessage { message, .. } => sequences.push(message.sequence),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(sequences, (1..=20).collect::<Vec<i64>>());
}

/// Delegates to the memory store but stalls every append
/// Memory store with configurable delays on selected operations
struct SlowStore {
    inner: MemoryChatStore,
    append_stall: Duration,
    get_chat_stall: Duration,
    contacts_stall: Duration,
    /// Only the next `shared_contacts` call is delayed
    contacts_armed: AtomicBool,
}

impl SlowStore {
    fn new(directory: Arc<MemoryUserDirectory>) -> Self {
        Self {
            inner: MemoryChatStore::new(directory),
            append_stall: Duration::ZERO,
            get_chat_stall: Duration::ZERO,
            contacts_stall: Duration::ZERO,
            contacts_armed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ChatStore for SlowStore {
    async fn get_chats_for_user(&self, user_id: Uuid) -> ChatResult<Vec<Chat>> {
        self.inner.get_chats_for_user(user_id).await
    }

    async fn get_chat(&self, chat_id: Uuid) -> ChatResult<Chat> {
        tokio::time::sleep(self.get_chat_stall).await;
        self.inner.get_chat(chat_id).await
    }

    async fn create_direct_chat(&self, user_id: Uuid, other_user_id: Uuid) -> ChatResult<Chat> {
        self.inner.create_direct_chat(user_id, other_user_id).await
    }

    async fn create_group_chat(
        &self,
        creator_id: Uuid,
        chat_name: &str,
        participants: &[Uuid],
    ) -> ChatResult<Chat> {
        self.inner
            .create_group_chat(creator_id, chat_name, participants)
            .await
    }

    async fn get_messages(
        &self,
        chat_id: Uuid,
        viewer_id: Uuid,
        pagination: Pagination,
    ) -> ChatResult<Vec<Message>> {
        self.inner.get_messages(chat_id, viewer_id, pagination).await
    }

    async fn append_message(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        content: &str,
        message_type: MessageType,
    ) -> ChatResult<AppendOutcome> {
        tokio::time::sleep(self.append_stall).await;
        self.inner
            .append_message(chat_id, sender_id, content, message_type)
            .await
    }

    async fn mark_read(&self, chat_id: Uuid, user_id: Uuid) -> ChatResult<Chat> {
        self.inner.mark_read(chat_id, user_id).await
    }

    async fn shared_contacts(&self, user_id: Uuid) -> ChatResult<BTreeSet<Uuid>> {
        if self.contacts_armed.swap(false, AtomicOrdering::SeqCst) {
            tokio::time::sleep(self.contacts_stall).await;
        }
        self.inner.shared_contacts(user_id).await
    }
}

#[tokio::test]
async fn test_stalled_store_surfaces_store_unavailable() {
    let directory = Arc::new(MemoryUserDirectory::new());
    let mut store = SlowStore::new(directory.clone());
    store.append_stall = Duration::from_secs(5);
    let store = Arc::new(store);
    let mut config = test_config();
    config.store_timeout_ms = 50;
    let ctx = TestContext::with_store(config, directory, store);

    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();
    let mut a_conn = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    for conn in [&a_conn, &b_conn] {
        ctx.gateway()
            .handle_command(conn.id, ClientCommand::JoinChat { chat_id: chat.id })
            .await
            .unwrap();
    }
    drain(&mut a_conn);
    drain(&mut b_conn);

    ctx.gateway().process(a_conn.id, send(chat.id, "hello?")).await;

    match next_event(&mut a_conn).await {
        ServerEvent::Error { code, command, .. } => {
            assert_eq!(code, ErrorCode::StoreUnavailable);
            assert!(code.is_retryable());
            assert_eq!(command.as_deref(), Some("sendMessage"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_no_event(&mut b_conn);

    // the connection keeps working after the timeout
    ctx.gateway()
        .handle_command(
            a_conn.id,
            ClientCommand::Typing {
                chat_id: chat.id,
                is_typing: false,
            },
        )
        .await
        .unwrap();
    assert_matches!(
        next_event(&mut b_conn).await,
        ServerEvent::UserTyping {
            is_typing: false,
            ..
        }
    );
}

#[tokio::test]
async fn test_rejected_connection_leaves_no_state() {
    let ctx = TestContext::new();
    let a = ctx.user("alice").await;

    let forged = a.token.replace('.', "x");
    assert!(ctx.gateway().connect(&forged).await.is_err());
    assert_eq!(ctx.gateway().connection_count(), 0);
    assert!(!ctx.gateway().presence().is_online(a.id()));
}

#[tokio::test]
async fn test_disconnect_during_join_leaves_no_membership() {
    let directory = Arc::new(MemoryUserDirectory::new());
    let mut store = SlowStore::new(directory.clone());
    store.get_chat_stall = Duration::from_millis(100);
    let ctx = TestContext::with_store(test_config(), directory, Arc::new(store));

    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();
    let conn = ctx.connect(&a).await;

    let gateway = ctx.gateway().clone();
    let (connection_id, chat_id) = (conn.id, chat.id);
    let join = tokio::spawn(async move {
        gateway
            .handle_command(connection_id, ClientCommand::JoinChat { chat_id })
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(ctx.gateway().disconnect(conn.id).await);
    join.await.unwrap().unwrap();

    assert!(!ctx.gateway().is_connected(conn.id));
    assert!(ctx.gateway().rooms().members_of(chat.id).is_empty());
    assert!(ctx.gateway().rooms().rooms_of(conn.id).is_empty());
}

#[tokio::test]
async fn test_slow_consumer_is_disconnected() {
    let mut config = test_config();
    config.outbound_queue_len = 2;
    let ctx = TestContext::with_config(config);

    let (a, b) = (ctx.user("alice").await, ctx.user("bob").await);
    let chat = ctx.store().create_direct_chat(a.id(), b.id()).await.unwrap();
    let mut a_conn = ctx.connect(&a).await;
    let mut b_conn = ctx.connect(&b).await;
    for conn in [&a_conn, &b_conn] {
        ctx.gateway()
            .handle_command(conn.id, ClientCommand::JoinChat { chat_id: chat.id })
            .await
            .unwrap();
    }
    drain(&mut a_conn);
    drain(&mut b_conn);

    // bob stops reading; his queue fills after two messages
    for content in ["one", "two"] {
        ctx.gateway()
            .handle_command(a_conn.id, send(chat.id, content))
            .await
            .unwrap();
        drain(&mut a_conn);
    }
    assert!(ctx.gateway().is_connected(b_conn.id));

    ctx.gateway()
        .handle_command(a_conn.id, send(chat.id, "three"))
        .await
        .unwrap();

    assert!(!ctx.gateway().is_connected(b_conn.id));
    assert!(!ctx.gateway().presence().is_online(b.id()));
    assert!(ctx.gateway().rooms().rooms_of(b_conn.id).is_empty());

    let events = drain(&mut a_conn);
    assert_matches!(events.as_slice(), [
        ServerEvent::NewMessage { .. },
        ServerEvent::UserOffline { user_id },
    ] if *user_id == b.id());

    // what was queued before the overflow is still delivered, then the queue ends
    for expected in ["one", "two"] {
        assert_matches!(
            next_event(&mut b_conn).await,
            ServerEvent::NewMessage { message, .. } if message.content == expected
        );
    }
    assert!(b_conn.events.recv().await.is_none());
}

#[tokio::test]
async fn test_presence_events_follow_transition_order() {
    let directory = Arc::new(MemoryUserDirectory::new());
    let mut store = SlowStore::new(directory.clone());
    store.contacts_stall = Duration::from_millis(100);
    let store = Arc::new(store);
    let ctx = TestContext::with_store(test_config(), directory, store.clone());

    let (a, c) = (ctx.user("alice").await, ctx.user("carol").await);
    ctx.store().create_direct_chat(a.id(), c.id()).await.unwrap();
    let mut observer = ctx.connect(&c).await;
    drain(&mut observer);

    // alice's online announcement resolves its audience slowly
    store.contacts_armed.store(true, AtomicOrdering::SeqCst);
    let gateway = ctx.gateway().clone();
    let token = a.token.clone();
    let connecting = tokio::spawn(async move { gateway.connect(&token).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let connection_id = *ctx
        .gateway()
        .presence()
        .connections_of(a.id())
        .iter()
        .next()
        .expect("alice is registered");
    assert!(ctx.gateway().disconnect(connection_id).await);
    connecting.await.unwrap().unwrap();

    assert_eq!(
        drain(&mut observer),
        vec![
            ServerEvent::UserOnline { user_id: a.id() },
            ServerEvent::UserOffline { user_id: a.id() },
        ]
    );
    assert!(!ctx.gateway().presence().is_online(a.id()));
}
