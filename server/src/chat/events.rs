//! Realtime event contracts.
//!
//! Frames are JSON text shaped `{"event": "<name>", "data": {...}}`.
//! Inbound frames are decoded into `ClientEvent` at the socket boundary, so
//! malformed payloads never reach the router.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::db::models::{Attachment, MessageKind, MessageView};
use crate::error::ChatError;

// --- Inbound ---

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage(SendMessagePayload),
    MarkAsRead(MarkAsReadPayload),
    Typing(TypingPayload),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub content: String,
    /// Required for admins, ignored for users.
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageKind>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadPayload {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub is_typing: bool,
    /// The user an admin is typing to.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl ClientEvent {
    pub fn decode(text: &str) -> Result<Self, ChatError> {
        serde_json::from_str(text)
            .map_err(|e| ChatError::Validation(format!("Invalid event payload: {}", e)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::MarkAsRead(_) => "mark_as_read",
            ClientEvent::Typing(_) => "typing",
        }
    }
}

// --- Outbound ---

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    MessageSent(MessageSentEvent),
    NewMessage(NewMessageEvent),
    MessagesRead(MessagesReadEvent),
    AdminTyping(AdminTypingEvent),
    UserTyping(UserTypingEvent),
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageSentEvent {
    pub message: MessageView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub message: MessageView,
    /// Originating user, set on user -> admin fan-out.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesReadEvent {
    pub message_ids: Vec<String>,
    /// Acting user, set when a user (not an admin) read the messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminTypingEvent {
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTypingEvent {
    pub is_typing: bool,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub code: u16,
    pub message: String,
}

impl ServerEvent {
    /// Error event scoped to the acting connection.
    pub fn error(err: &ChatError) -> Self {
        ServerEvent::Error(ErrorEvent {
            code: err.status().as_u16(),
            message: err.public_message(),
        })
    }

    /// Encode as a WebSocket text frame.
    pub fn to_frame(&self) -> Option<Message> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                None
            }
        }
    }
}
