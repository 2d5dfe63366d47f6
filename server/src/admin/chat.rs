//! Admin console endpoints: inbox, per-user threads, replies, counters,
//! and retention controls. All of them require the admin role.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::auth::middleware::AdminClaims;
use crate::chat::admin_view::{self, AdminStatistics};
use crate::chat::events::SendMessagePayload;
use crate::chat::messages::{mirror_identity, LimitQuery};
use crate::chat::retention::{SweepOutcome, SweepReport, SweepStatus, SweepTrigger};
use crate::chat::router;
use crate::db::models::{ConversationSummary, MessageView};
use crate::error::ChatResult;
use crate::routes::ApiResponse;
use crate::state::AppState;
use crate::ws::handler::connection_metadata;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    /// False when another sweep was already running.
    pub ran: bool,
    pub report: Option<SweepReport>,
}

/// GET /api/admin/chat/conversations?limit=
pub async fn list_conversations(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
    Query(query): Query<LimitQuery>,
) -> ChatResult<Json<ApiResponse<Vec<ConversationSummary>>>> {
    let admin = claims.into_identity();
    let inbox = admin_view::recent_conversations(&state, &admin, query.limit).await?;
    Ok(Json(ApiResponse::ok(inbox)))
}

/// GET /api/admin/chat/conversations/{user_id}?limit=
pub async fn get_user_conversation(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
    Path(user_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ChatResult<Json<ApiResponse<Vec<MessageView>>>> {
    let admin = claims.into_identity();
    let thread = router::conversation_for(&state, &admin, Some(user_id), query.limit).await?;
    Ok(Json(ApiResponse::ok(thread)))
}

/// POST /api/admin/chat/messages
pub async fn send_message(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    AdminClaims(claims): AdminClaims,
    Json(body): Json<SendMessagePayload>,
) -> ChatResult<(StatusCode, Json<ApiResponse<MessageView>>)> {
    let admin = claims.into_identity();
    mirror_identity(&state, &admin).await?;

    let metadata = connection_metadata(&headers, peer);
    let view = router::send(&state, &admin, body.into(), metadata).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// GET /api/admin/chat/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
) -> ChatResult<Json<ApiResponse<UnreadCountResponse>>> {
    let admin = claims.into_identity();
    let unread_count = admin_view::unread_count(&state, &admin).await?;
    Ok(Json(ApiResponse::ok(UnreadCountResponse { unread_count })))
}

/// GET /api/admin/chat/statistics
pub async fn statistics(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
) -> ChatResult<Json<ApiResponse<AdminStatistics>>> {
    let admin = claims.into_identity();
    let stats = admin_view::statistics(&state, &admin).await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /api/admin/chat/cleanup
/// Manual retention sweep. Shares the single-flight guard with the schedule.
pub async fn run_cleanup(
    State(state): State<AppState>,
    AdminClaims(claims): AdminClaims,
) -> ChatResult<Json<ApiResponse<CleanupResponse>>> {
    tracing::info!(admin_id = %claims.sub, "Manual retention sweep requested");
    let response = match state.sweeper.run_now(SweepTrigger::Manual).await? {
        SweepOutcome::Completed(report) => CleanupResponse {
            ran: true,
            report: Some(report),
        },
        SweepOutcome::Skipped => CleanupResponse {
            ran: false,
            report: None,
        },
    };
    Ok(Json(ApiResponse::ok(response)))
}

/// GET /api/admin/chat/cleanup/status
pub async fn cleanup_status(
    State(state): State<AppState>,
    AdminClaims(_claims): AdminClaims,
) -> ChatResult<Json<ApiResponse<SweepStatus>>> {
    let status = state.sweeper.status().await?;
    Ok(Json(ApiResponse::ok(status)))
}
