//! Read-only aggregations backing the admin console.

use chrono::{NaiveTime, Utc};
use serde::Serialize;

use crate::chat::store::{self, ChatStatistics};
use crate::db::models::{ConversationSummary, Identity};
use crate::db::run_blocking;
use crate::error::ChatResult;
use crate::state::AppState;

/// Inbox: one entry per conversation the admin takes part in, newest first.
pub async fn recent_conversations(
    state: &AppState,
    admin: &Identity,
    limit: Option<u32>,
) -> ChatResult<Vec<ConversationSummary>> {
    let limit = state.chat.page_size(limit);
    let admin_id = admin.id.clone();
    run_blocking(&state.db, move |db| {
        store::get_recent_conversations_for_admin(db, &admin_id, limit)
    })
    .await
}

/// Live messages from users still awaiting this admin's read.
pub async fn unread_count(state: &AppState, admin: &Identity) -> ChatResult<i64> {
    let admin_id = admin.id.clone();
    run_blocking(&state.db, move |db| {
        store::get_unread_count_for_admin(db, &admin_id)
    })
    .await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStatistics {
    #[serde(flatten)]
    pub totals: ChatStatistics,
    pub online_users: usize,
    pub online_admins: usize,
}

/// Store totals plus live connection counts. "Today" starts at UTC midnight.
pub async fn statistics(state: &AppState, admin: &Identity) -> ChatResult<AdminStatistics> {
    let since = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
    let admin_id = admin.id.clone();
    let totals = run_blocking(&state.db, move |db| {
        store::statistics(db, &admin_id, since)
    })
    .await?;

    Ok(AdminStatistics {
        totals,
        online_users: state.connections.online_users(),
        online_admins: state.connections.online_admins(),
    })
}
