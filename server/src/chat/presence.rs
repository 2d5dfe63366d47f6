//! Typing indicators. Ephemeral: never persisted, never retried.
//!
//! Directed like message fan-out: admin -> one user, user -> every admin.

use crate::chat::events::{AdminTypingEvent, ServerEvent, UserTypingEvent};
use crate::db::models::{Identity, Role};
use crate::error::{ChatError, ChatResult};
use crate::state::AppState;

/// Relay a typing state change. Returns how many connections it reached.
pub fn set_typing(
    state: &AppState,
    identity: &Identity,
    is_typing: bool,
    counterpart_id: Option<&str>,
) -> ChatResult<usize> {
    let reached = match identity.role {
        Role::Admin => {
            let user_id = counterpart_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .ok_or_else(|| {
                    ChatError::Validation("userId is required for admin typing".to_string())
                })?;
            let event = ServerEvent::AdminTyping(AdminTypingEvent { is_typing });
            usize::from(state.connections.send_to(Role::User, user_id, &event))
        }
        Role::User => state
            .connections
            .publish_to_admins(&ServerEvent::UserTyping(UserTypingEvent {
                is_typing,
                user_id: identity.id.clone(),
            })),
    };

    tracing::trace!(identity_id = %identity.id, is_typing, reached, "Typing relayed");
    Ok(reached)
}
