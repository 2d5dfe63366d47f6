//! REST endpoints for the user side of the chat.
//! The realtime channel is the primary path; these are the HTTP fallback.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::chat::events::{MarkAsReadPayload, SendMessagePayload};
use crate::chat::{router, store};
use crate::db::models::{Identity, MessageView};
use crate::db::run_blocking;
use crate::error::ChatResult;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::ws::handler::connection_metadata;

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReadResponse {
    pub updated: usize,
}

/// Record the caller so later sends can resolve it as a receiver.
pub(crate) async fn mirror_identity(state: &AppState, identity: &Identity) -> ChatResult<()> {
    let identity = identity.clone();
    run_blocking(&state.db, move |db| store::upsert_identity(db, &identity)).await
}

/// POST /api/chat/messages
/// Send as the authenticated caller. Admins must name a `receiverId`.
pub async fn send_message(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    claims: Claims,
    Json(body): Json<SendMessagePayload>,
) -> ChatResult<(StatusCode, Json<ApiResponse<MessageView>>)> {
    let identity = claims.into_identity();
    mirror_identity(&state, &identity).await?;

    let metadata = connection_metadata(&headers, peer);
    let view = router::send(&state, &identity, body.into(), metadata).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /api/chat/conversation?limit=
/// The caller's thread with the support account, oldest first.
pub async fn get_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Query(query): Query<LimitQuery>,
) -> ChatResult<Json<ApiResponse<Vec<MessageView>>>> {
    let identity = claims.into_identity();
    let messages = router::conversation_for(&state, &identity, None, query.limit).await?;
    Ok(Json(ApiResponse::ok(messages)))
}

/// PUT /api/chat/messages/read
pub async fn mark_read(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<MarkAsReadPayload>,
) -> ChatResult<Json<ApiResponse<MarkReadResponse>>> {
    let identity = claims.into_identity();
    let outcome = router::mark_read(&state, &identity, body.message_ids).await?;
    Ok(Json(ApiResponse::ok(MarkReadResponse {
        updated: outcome.updated,
    })))
}
