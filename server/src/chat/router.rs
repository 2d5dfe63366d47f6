//! Message router: validates and persists sends, then fans out.
//!
//! Ordering contract: the store write happens before any event leaves the
//! process. Fan-out is fire-and-forget; an offline recipient is not an error
//! and simply sees the message on its next fetch.

use std::collections::HashSet;

use chrono::Utc;

use crate::chat::events::{
    MessageSentEvent, MessagesReadEvent, NewMessageEvent, SendMessagePayload, ServerEvent,
};
use crate::chat::store::{self, ReadOutcome};
use crate::config::ReadReceiptScope;
use crate::db::models::{
    Attachment, Identity, Message, MessageKind, MessageMetadata, MessageView, Role,
};
use crate::db::run_blocking;
use crate::error::{ChatError, ChatResult};
use crate::state::AppState;

/// Largest id list accepted by a single `mark_read`.
const MAX_READ_BATCH: usize = 500;

/// A send request after boundary decoding, before validation.
#[derive(Debug, Clone, Default)]
pub struct OutgoingMessage {
    pub content: String,
    pub receiver_id: Option<String>,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
}

impl From<SendMessagePayload> for OutgoingMessage {
    fn from(payload: SendMessagePayload) -> Self {
        Self {
            content: payload.content,
            receiver_id: payload.receiver_id,
            kind: payload.kind.unwrap_or_default(),
            attachments: payload.attachments,
        }
    }
}

fn validate_content(content: &str, max_chars: usize) -> ChatResult<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ChatError::Validation(
            "Message content cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ChatError::Validation(format!(
            "Message content cannot exceed {} characters",
            max_chars
        )));
    }
    Ok(trimmed.to_string())
}

/// Resolve who a message goes to. Admins name a user explicitly; users
/// always write to the configured support account.
async fn resolve_receiver(
    state: &AppState,
    sender: &Identity,
    receiver_id: Option<String>,
) -> ChatResult<Identity> {
    match sender.role {
        Role::Admin => {
            let receiver_id = receiver_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    ChatError::Validation("receiverId is required for admin messages".to_string())
                })?;
            if receiver_id == sender.id {
                return Err(ChatError::Validation(
                    "Cannot send a message to yourself".to_string(),
                ));
            }
            let receiver = run_blocking(&state.db, move |db| {
                store::find_identity(db, &receiver_id)
            })
            .await?
            .ok_or_else(|| ChatError::NotFound("Receiver".to_string()))?;
            if receiver.role != Role::User {
                return Err(ChatError::Validation(
                    "Receiver must be a user account".to_string(),
                ));
            }
            Ok(receiver)
        }
        Role::User => support_account(state).await,
    }
}

/// The admin account user messages are addressed to.
pub async fn support_account(state: &AppState) -> ChatResult<Identity> {
    let email = state.chat.support_account.clone();
    run_blocking(&state.db, move |db| {
        store::resolve_support_account(db, email.as_deref())
    })
    .await?
    .ok_or_else(|| ChatError::NotFound("Support account".to_string()))
}

/// Id the pool's threads are filed under: the support account, or `fallback`
/// when none resolves.
async fn pool_anchor(state: &AppState, fallback: &str) -> ChatResult<String> {
    match support_account(state).await {
        Ok(support) => Ok(support.id),
        Err(ChatError::NotFound(_)) => Ok(fallback.to_string()),
        Err(e) => Err(e),
    }
}

/// Validate, persist, acknowledge, and fan out one message.
///
/// Every admin in the pool writes into the user's single thread with the
/// support account; `sender_id` still names the admin who wrote it.
pub async fn send(
    state: &AppState,
    sender: &Identity,
    outgoing: OutgoingMessage,
    metadata: MessageMetadata,
) -> ChatResult<MessageView> {
    let content = validate_content(&outgoing.content, state.chat.max_content_length)?;
    let receiver = resolve_receiver(state, sender, outgoing.receiver_id).await?;
    let conversation_id = match sender.role {
        Role::Admin => {
            store::compute_conversation_id(&receiver.id, &pool_anchor(state, &sender.id).await?)
        }
        Role::User => store::compute_conversation_id(&sender.id, &receiver.id),
    };

    let message = Message::compose(
        sender,
        &receiver.id,
        content,
        outgoing.kind,
        outgoing.attachments,
        metadata,
    )
    .in_conversation(conversation_id);
    let row = message.clone();
    run_blocking(&state.db, move |db| store::insert_message(db, &row)).await?;

    let sender_name = Some(sender.name.clone()).filter(|n| !n.is_empty());
    let view = MessageView::new(message, sender_name);

    tracing::info!(
        message_id = %view.message.id,
        conversation_id = %view.message.conversation_id,
        sender_id = %sender.id,
        receiver_id = %receiver.id,
        "Message persisted"
    );

    state.connections.send_to(
        sender.role,
        &sender.id,
        &ServerEvent::MessageSent(MessageSentEvent {
            message: view.clone(),
        }),
    );

    match sender.role {
        Role::Admin => {
            let event = ServerEvent::NewMessage(NewMessageEvent {
                message: view.clone(),
                user_id: None,
            });
            let online = match state.connections.lookup_user(&receiver.id) {
                Some(handle) => {
                    handle.push(&event);
                    true
                }
                None => false,
            };
            tracing::debug!(receiver_id = %receiver.id, online, "Admin message fan-out");
        }
        Role::User => {
            let event = ServerEvent::NewMessage(NewMessageEvent {
                message: view.clone(),
                user_id: Some(sender.id.clone()),
            });
            let recipients = state.connections.publish_to_admins(&event);
            tracing::debug!(user_id = %sender.id, recipients, "User message fan-out");
        }
    }

    Ok(view)
}

/// Mark messages addressed to `reader` as read, then announce it.
///
/// The announcement goes out only after the write commits; a store error
/// returns before anything is broadcast.
pub async fn mark_read(
    state: &AppState,
    reader: &Identity,
    message_ids: Vec<String>,
) -> ChatResult<ReadOutcome> {
    let mut seen = HashSet::new();
    let ids: Vec<String> = message_ids
        .into_iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty() && seen.insert(id.clone()))
        .collect();
    if ids.is_empty() {
        return Err(ChatError::Validation(
            "messageIds must contain at least one id".to_string(),
        ));
    }
    if ids.len() > MAX_READ_BATCH {
        return Err(ChatError::Validation(format!(
            "At most {} messages can be marked read at once",
            MAX_READ_BATCH
        )));
    }

    let reader_id = reader.id.clone();
    let batch = ids.clone();
    let outcome = run_blocking(&state.db, move |db| {
        store::mark_read(db, &reader_id, &batch, Utc::now())
    })
    .await?;

    let recipients = announce_read(state, reader, ids, &outcome);
    tracing::debug!(
        reader_id = %reader.id,
        updated = outcome.updated,
        recipients,
        "Messages marked read"
    );

    Ok(outcome)
}

/// Group scope repeats the requested ids to the whole other side. Counterpart
/// scope tells each sender only about its own messages that flipped.
fn announce_read(
    state: &AppState,
    reader: &Identity,
    message_ids: Vec<String>,
    outcome: &ReadOutcome,
) -> usize {
    let user_id = (reader.role == Role::User).then(|| reader.id.clone());
    let receipt = |message_ids: Vec<String>| {
        ServerEvent::MessagesRead(MessagesReadEvent {
            message_ids,
            user_id: user_id.clone(),
        })
    };

    match (state.chat.read_receipt_scope, reader.role) {
        (ReadReceiptScope::Group, Role::Admin) => {
            state.connections.publish_to_users(&receipt(message_ids))
        }
        (ReadReceiptScope::Group, Role::User) => {
            state.connections.publish_to_admins(&receipt(message_ids))
        }
        (ReadReceiptScope::Counterpart, role) => {
            let counterpart_role = match role {
                Role::Admin => Role::User,
                Role::User => Role::Admin,
            };
            outcome
                .by_sender
                .iter()
                .filter(|(sender_id, ids)| {
                    state
                        .connections
                        .send_to(counterpart_role, sender_id, &receipt(ids.to_vec()))
                })
                .count()
        }
    }
}

/// A user's thread with the support account, oldest-first.
/// Users always read their own; admins name the user and all see the same thread.
pub async fn conversation_for(
    state: &AppState,
    viewer: &Identity,
    counterpart_id: Option<String>,
    limit: Option<u32>,
) -> ChatResult<Vec<MessageView>> {
    let limit = state.chat.page_size(limit);
    let (user_id, anchor_id) = match viewer.role {
        Role::User => (viewer.id.clone(), support_account(state).await?.id),
        Role::Admin => {
            let user_id = counterpart_id
                .filter(|id| !id.trim().is_empty())
                .ok_or_else(|| ChatError::Validation("userId is required".to_string()))?;
            let lookup = user_id.clone();
            run_blocking(&state.db, move |db| store::find_identity(db, &lookup))
                .await?
                .ok_or_else(|| ChatError::NotFound("User".to_string()))?;
            (user_id, pool_anchor(state, &viewer.id).await?)
        }
    };

    run_blocking(&state.db, move |db| {
        store::get_conversation(db, &user_id, &anchor_id, limit)
    })
    .await
}
