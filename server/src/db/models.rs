//! Row and domain types for the identities and messages tables.
//! These correspond 1:1 to the SQLite schema defined in migrations.rs.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Format a timestamp the way every column stores it: RFC 3339, UTC, millis.
/// Fixed width keeps lexical order equal to chronological order.
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// An authenticated participant, as resolved from a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::File => "file",
            MessageKind::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageKind::Text),
            "image" => Some(MessageKind::Image),
            "file" => Some(MessageKind::File),
            "system" => Some(MessageKind::System),
            _ => None,
        }
    }
}

/// Delivery state. Moves forward along sent -> delivered -> read;
/// `Failed` is reachable from anywhere non-terminal and is itself terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sent => "sent",
            MessageStatus::Delivered => "delivered",
            MessageStatus::Read => "read",
            MessageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(MessageStatus::Sent),
            "delivered" => Some(MessageStatus::Delivered),
            "read" => Some(MessageStatus::Read),
            "failed" => Some(MessageStatus::Failed),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            MessageStatus::Sent => 0,
            MessageStatus::Delivered => 1,
            MessageStatus::Read => 2,
            MessageStatus::Failed => 3,
        }
    }

    /// Whether `self -> next` is a legal step. Staying put is not a transition.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        match (self, next) {
            (MessageStatus::Failed, _) => false,
            (_, MessageStatus::Failed) => true,
            (current, next) => next.rank() > current.rank(),
        }
    }

    pub const ALL: [MessageStatus; 4] = [
        MessageStatus::Sent,
        MessageStatus::Delivered,
        MessageStatus::Read,
        MessageStatus::Failed,
    ];

    /// Every status with a legal step to `target`.
    pub fn sources_of(target: MessageStatus) -> impl Iterator<Item = MessageStatus> {
        Self::ALL
            .into_iter()
            .filter(move |status| status.can_transition_to(target))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A persisted chat message.
///
/// The direction flags are not stored on the struct; they are derived from
/// `origin` so exactly one of them can ever be true.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub status: MessageStatus,
    pub conversation_id: String,
    #[serde(skip)]
    pub origin: Role,
    pub metadata: MessageMetadata,
    pub attachments: Vec<Attachment>,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The only constructor for new messages. Stamps identity, conversation,
    /// direction, and `status = sent`.
    pub fn compose(
        sender: &Identity,
        receiver_id: &str,
        content: String,
        kind: MessageKind,
        attachments: Vec<Attachment>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            sender_id: sender.id.clone(),
            receiver_id: receiver_id.to_string(),
            content,
            kind,
            status: MessageStatus::Sent,
            conversation_id: crate::chat::store::compute_conversation_id(&sender.id, receiver_id),
            origin: sender.role,
            metadata,
            attachments,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    /// File the message under another conversation. Replies from any pool
    /// admin are filed under the user's thread with the support account.
    pub fn in_conversation(mut self, conversation_id: String) -> Self {
        self.conversation_id = conversation_id;
        self
    }

    pub fn is_from_admin(&self) -> bool {
        self.origin == Role::Admin
    }

    pub fn is_from_user(&self) -> bool {
        self.origin == Role::User
    }
}

/// Display-enriched wire form of a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_from_admin: bool,
    pub is_from_user: bool,
    pub sender_name: Option<String>,
}

impl MessageView {
    pub fn new(message: Message, sender_name: Option<String>) -> Self {
        Self {
            is_from_admin: message.is_from_admin(),
            is_from_user: message.is_from_user(),
            message,
            sender_name,
        }
    }
}

/// Per-conversation summary for the admin inbox.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub user: Counterpart,
    pub last_message: MessageView,
    pub total_messages: i64,
    pub unread_count: i64,
}

/// The non-admin side of a conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterpart {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}
