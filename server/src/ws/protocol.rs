use crate::chat::events::{ClientEvent, ServerEvent};
use crate::chat::{presence, router};
use crate::db::models::{Identity, MessageMetadata};
use crate::error::ChatResult;
use crate::state::AppState;
use crate::ws::ConnectionSender;

/// Dispatch a decoded client event to its handler. Failures are reported to
/// the acting connection only; nothing is broadcast for a failed operation.
pub async fn dispatch(
    event: ClientEvent,
    state: &AppState,
    identity: &Identity,
    metadata: &MessageMetadata,
    tx: &ConnectionSender,
) {
    let name = event.name();
    if let Err(err) = handle(event, state, identity, metadata).await {
        tracing::debug!(
            user_id = %identity.id,
            event = name,
            error = %err,
            "Client event failed"
        );
        if let Some(frame) = ServerEvent::error(&err).to_frame() {
            let _ = tx.send(frame);
        }
    }
}

async fn handle(
    event: ClientEvent,
    state: &AppState,
    identity: &Identity,
    metadata: &MessageMetadata,
) -> ChatResult<()> {
    match event {
        ClientEvent::SendMessage(payload) => {
            router::send(state, identity, payload.into(), metadata.clone()).await?;
        }
        ClientEvent::MarkAsRead(payload) => {
            router::mark_read(state, identity, payload.message_ids).await?;
        }
        ClientEvent::Typing(payload) => {
            presence::set_typing(state, identity, payload.is_typing, payload.user_id.as_deref())?;
        }
    }
    Ok(())
}
