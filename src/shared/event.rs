/**
 * Realtime Wire Protocol
 *
 * This module defines the frames exchanged over a live socket connection.
 * Every frame is a JSON object with an `event` name and a `data` payload:
 *
 * ```json
 * {"event": "sendMessage", "data": {"chatId": "...", "content": "hi", "messageType": "text"}}
 * ```
 *
 * # Client -> Server
 *
 * - `joinChats { chatIds }`, `joinChat { chatId }`, `leaveChat { chatId }`
 * - `sendMessage { chatId, content, messageType }`
 * - `typing { chatId, isTyping }`
 * - `getOnlineUsers` (no payload)
 *
 * # Server -> Client
 *
 * - `newMessage { chatId, message, chat }`
 * - `userTyping { userId, username, chatId, isTyping }`
 * - `userOnline { userId }`, `userOffline { userId }`
 * - `onlineUsers { userIds }`
 * - `error { code, message, command }`
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chat::Chat;
use super::error::ErrorCode;
use super::message::{Message, MessageType};

/// Command sent by a client over its live connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientCommand {
    JoinChats {
        chat_ids: Vec<Uuid>,
    },
    JoinChat {
        chat_id: Uuid,
    },
    LeaveChat {
        chat_id: Uuid,
    },
    SendMessage {
        chat_id: Uuid,
        content: String,
        #[serde(default)]
        message_type: MessageType,
    },
    Typing {
        chat_id: Uuid,
        is_typing: bool,
    },
    GetOnlineUsers,
}

impl ClientCommand {
    /// Wire name of the command, echoed back in `error` events
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinChats { .. } => "joinChats",
            ClientCommand::JoinChat { .. } => "joinChat",
            ClientCommand::LeaveChat { .. } => "leaveChat",
            ClientCommand::SendMessage { .. } => "sendMessage",
            ClientCommand::Typing { .. } => "typing",
            ClientCommand::GetOnlineUsers => "getOnlineUsers",
        }
    }
}

/// Event pushed by the server to a live connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    NewMessage {
        chat_id: Uuid,
        message: Message,
        chat: Chat,
    },
    UserTyping {
        user_id: Uuid,
        username: String,
        chat_id: Uuid,
        is_typing: bool,
    },
    UserOnline {
        user_id: Uuid,
    },
    UserOffline {
        user_id: Uuid,
    },
    OnlineUsers {
        user_ids: Vec<Uuid>,
    },
    Error {
        code: ErrorCode,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
}

impl ServerEvent {
    /// Create a structured failure addressed to the originating connection
    pub fn error(code: ErrorCode, message: impl Into<String>, command: Option<&str>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
            command: command.map(str::to_string),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::NewMessage { .. } => "newMessage",
            ServerEvent::UserTyping { .. } => "userTyping",
            ServerEvent::UserOnline { .. } => "userOnline",
            ServerEvent::UserOffline { .. } => "userOffline",
            ServerEvent::OnlineUsers { .. } => "onlineUsers",
            ServerEvent::Error { .. } => "error",
        }
    }
}
