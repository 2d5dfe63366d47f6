//! Conversation store: the persisted message log and its read models.
//!
//! A conversation is not a row of its own. It is the set of messages sharing
//! a `conversation_id` derived from the two participant ids. Every read path
//! and aggregation here filters out soft-deleted rows.
//!
//! All functions are synchronous and expect to be called from
//! `tokio::task::spawn_blocking`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{types::Type, Row, ToSql};
use serde::Serialize;

use crate::db::models::{
    format_ts, parse_ts, Attachment, ConversationSummary, Counterpart, Identity, Message,
    MessageKind, MessageMetadata, MessageStatus, MessageView, Role,
};
use crate::db::DbPool;
use crate::error::ChatResult;

/// Separator between the two sorted participant ids.
const CONVERSATION_DELIMITER: &str = "_";

/// Column list shared by every message read. `message_from_row` depends on
/// this order; the sender's display name follows at index 16.
const MESSAGE_COLUMNS: &str = "m.id, m.sender_id, m.receiver_id, m.content, m.message_type,
     m.status, m.conversation_id, m.is_from_admin, m.ip_address, m.user_agent,
     m.device_info, m.attachments, m.read_at, m.is_deleted, m.deleted_at, m.created_at";

/// SQL list of the statuses a message can still be marked read from,
/// e.g. `'sent', 'delivered'`.
fn unread_status_list() -> String {
    MessageStatus::sources_of(MessageStatus::Read)
        .map(|status| format!("'{}'", status.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Deterministic conversation id for a pair of participants.
/// Commutative: the pair is sorted before joining.
pub fn compute_conversation_id(id_a: &str, id_b: &str) -> String {
    let (first, second) = if id_a <= id_b { (id_a, id_b) } else { (id_b, id_a) };
    format!("{}{}{}", first, CONVERSATION_DELIMITER, second)
}

// --- Identities ---

/// Mirror a validated identity so it can later be resolved as a receiver.
pub fn upsert_identity(db: &DbPool, identity: &Identity) -> ChatResult<()> {
    let conn = db.lock()?;
    let now = format_ts(&Utc::now());
    conn.execute(
        "INSERT INTO identities (id, email, display_name, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(id) DO UPDATE SET
             email = excluded.email,
             display_name = excluded.display_name,
             role = excluded.role,
             updated_at = excluded.updated_at",
        rusqlite::params![
            identity.id,
            identity.email,
            identity.name,
            identity.role.as_str(),
            now
        ],
    )?;
    Ok(())
}

fn identity_from_row(row: &Row<'_>) -> rusqlite::Result<Identity> {
    let role: String = row.get(3)?;
    Ok(Identity {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        role: Role::parse(&role).ok_or_else(|| invalid_column(3, "role", &role))?,
    })
}

pub fn find_identity(db: &DbPool, id: &str) -> ChatResult<Option<Identity>> {
    let conn = db.lock()?;
    let mut stmt =
        conn.prepare("SELECT id, email, display_name, role FROM identities WHERE id = ?1")?;
    let mut rows = stmt.query_map(rusqlite::params![id], identity_from_row)?;
    Ok(rows.next().transpose()?)
}

/// Resolve the admin account that user messages are addressed to.
/// With a configured email, only an admin with that email qualifies;
/// otherwise the oldest admin on record is used.
pub fn resolve_support_account(db: &DbPool, email: Option<&str>) -> ChatResult<Option<Identity>> {
    let conn = db.lock()?;
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, role FROM identities
         WHERE role = 'admin' AND (?1 IS NULL OR lower(email) = lower(?1))
         ORDER BY created_at ASC, id ASC
         LIMIT 1",
    )?;
    let mut rows = stmt.query_map(rusqlite::params![email], identity_from_row)?;
    Ok(rows.next().transpose()?)
}

// --- Messages ---

fn invalid_column(index: usize, name: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        Type::Text,
        format!("invalid {} value: {}", name, value).into(),
    )
}

fn ts_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        Some(raw) => parse_ts(&raw)
            .map(Some)
            .ok_or_else(|| invalid_column(index, "timestamp", &raw)),
        None => Ok(None),
    }
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let kind: String = row.get(4)?;
    let status: String = row.get(5)?;
    let attachments: String = row.get(11)?;
    let created_at = ts_column(row, 15)?.ok_or_else(|| invalid_column(15, "created_at", ""))?;

    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        kind: MessageKind::parse(&kind).ok_or_else(|| invalid_column(4, "message_type", &kind))?,
        status: MessageStatus::parse(&status)
            .ok_or_else(|| invalid_column(5, "status", &status))?,
        conversation_id: row.get(6)?,
        origin: if row.get::<_, bool>(7)? {
            Role::Admin
        } else {
            Role::User
        },
        metadata: MessageMetadata {
            ip_address: row.get(8)?,
            user_agent: row.get(9)?,
            device_info: row.get(10)?,
        },
        attachments: serde_json::from_str::<Vec<Attachment>>(&attachments)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(11, Type::Text, Box::new(e)))?,
        read_at: ts_column(row, 12)?,
        is_deleted: row.get(13)?,
        deleted_at: ts_column(row, 14)?,
        created_at,
    })
}

fn view_from_row(row: &Row<'_>) -> rusqlite::Result<MessageView> {
    Ok(MessageView::new(message_from_row(row)?, row.get(16)?))
}

/// Persist a freshly composed message. This is the single write of the send path.
pub fn insert_message(db: &DbPool, message: &Message) -> ChatResult<()> {
    let attachments = serde_json::to_string(&message.attachments)
        .map_err(|e| crate::error::ChatError::Persistence(e.to_string()))?;
    let conn = db.lock()?;
    conn.execute(
        "INSERT INTO messages (
             id, sender_id, receiver_id, content, message_type, status, conversation_id,
             is_from_admin, is_from_user, ip_address, user_agent, device_info, attachments,
             read_at, is_deleted, deleted_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        rusqlite::params![
            message.id,
            message.sender_id,
            message.receiver_id,
            message.content,
            message.kind.as_str(),
            message.status.as_str(),
            message.conversation_id,
            message.is_from_admin(),
            message.is_from_user(),
            message.metadata.ip_address,
            message.metadata.user_agent,
            message.metadata.device_info,
            attachments,
            message.read_at.as_ref().map(format_ts),
            message.is_deleted,
            message.deleted_at.as_ref().map(format_ts),
            format_ts(&message.created_at),
        ],
    )?;
    Ok(())
}

/// The most recent `limit` live messages between two participants,
/// returned oldest-first for thread rendering.
pub fn get_conversation(
    db: &DbPool,
    id_a: &str,
    id_b: &str,
    limit: u32,
) -> ChatResult<Vec<MessageView>> {
    let conversation_id = compute_conversation_id(id_a, id_b);
    let conn = db.lock()?;
    let sql = format!(
        "SELECT {}, s.display_name
         FROM messages m
         LEFT JOIN identities s ON s.id = m.sender_id
         WHERE m.conversation_id = ?1 AND m.is_deleted = 0
         ORDER BY m.seq DESC
         LIMIT ?2",
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut messages = stmt
        .query_map(rusqlite::params![conversation_id, limit], view_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}

/// Live, user-authored messages addressed to `admin_id` that are not yet read.
pub fn get_unread_count_for_admin(db: &DbPool, admin_id: &str) -> ChatResult<i64> {
    let conn = db.lock()?;
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM messages
             WHERE receiver_id = ?1 AND is_from_user = 1 AND is_deleted = 0
               AND status IN ({})",
            unread_status_list()
        ),
        rusqlite::params![admin_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Inbox for one admin, built in a single grouped query.
///
/// Every live message of a conversation `admin_id` takes part in is
/// partitioned by conversation, including replies other admins wrote into
/// it. The newest row of each partition is the representative, and the
/// partition totals give the message and unread-from-user counts.
pub fn get_recent_conversations_for_admin(
    db: &DbPool,
    admin_id: &str,
    limit: u32,
) -> ChatResult<Vec<ConversationSummary>> {
    let conn = db.lock()?;
    let sql = format!(
        "WITH scoped AS (
             SELECT * FROM messages
             WHERE is_deleted = 0 AND conversation_id IN (
                 SELECT conversation_id FROM messages
                 WHERE is_deleted = 0 AND (sender_id = ?1 OR receiver_id = ?1)
             )
         ),
         ranked AS (
             SELECT scoped.*,
                    ROW_NUMBER() OVER (PARTITION BY conversation_id ORDER BY seq DESC) AS rn,
                    COUNT(*) OVER (PARTITION BY conversation_id) AS total_messages,
                    SUM(CASE WHEN is_from_user = 1 AND receiver_id = ?1
                                  AND status IN ({})
                             THEN 1 ELSE 0 END)
                        OVER (PARTITION BY conversation_id) AS unread_count
             FROM scoped
         )
         SELECT {}, s.display_name, m.total_messages, m.unread_count,
                c.display_name, c.email
         FROM ranked m
         LEFT JOIN identities s ON s.id = m.sender_id
         LEFT JOIN identities c
                ON c.id = CASE WHEN m.is_from_user = 1 THEN m.sender_id ELSE m.receiver_id END
         WHERE m.rn = 1
         ORDER BY m.seq DESC
         LIMIT ?2",
        unread_status_list(),
        MESSAGE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let summaries = stmt
        .query_map(rusqlite::params![admin_id, limit], |row| {
            let last_message = view_from_row(row)?;
            let counterpart_id = if last_message.message.is_from_user() {
                last_message.message.sender_id.clone()
            } else {
                last_message.message.receiver_id.clone()
            };
            Ok(ConversationSummary {
                conversation_id: last_message.message.conversation_id.clone(),
                user: Counterpart {
                    id: counterpart_id,
                    name: row.get(19)?,
                    email: row.get(20)?,
                },
                total_messages: row.get(17)?,
                unread_count: row.get(18)?,
                last_message,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(summaries)
}

/// Result of a bulk read acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Rows that actually flipped to `read` in this call.
    pub updated: usize,
    /// Ids of the rows that flipped, keyed by their sender.
    pub by_sender: BTreeMap<String, Vec<String>>,
}

/// Mark messages addressed to `reader_id` as read.
///
/// Only live rows still in an unread status are touched, so re-applying the
/// same ids leaves `status` and `read_at` unchanged.
pub fn mark_read(
    db: &DbPool,
    reader_id: &str,
    message_ids: &[String],
    now: DateTime<Utc>,
) -> ChatResult<ReadOutcome> {
    if message_ids.is_empty() {
        return Ok(ReadOutcome::default());
    }

    let now = format_ts(&now);
    let placeholders = (0..message_ids.len())
        .map(|i| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let filter = format!(
        "receiver_id = ?2 AND is_deleted = 0 AND status IN ({}) AND id IN ({})",
        unread_status_list(),
        placeholders
    );

    let mut params: Vec<&dyn ToSql> = Vec::with_capacity(message_ids.len() + 2);
    params.push(&now);
    params.push(&reader_id);
    for id in message_ids {
        params.push(id);
    }

    let mut conn = db.lock()?;
    let tx = conn.transaction()?;

    let mut by_sender: BTreeMap<String, Vec<String>> = BTreeMap::new();
    {
        // ?1 is unused by the select but keeps the numbering shared with the update
        let mut stmt = tx.prepare(&format!(
            "SELECT sender_id, id FROM messages WHERE ?1 IS NOT NULL AND {} ORDER BY seq",
            filter
        ))?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (sender_id, id) = row?;
            by_sender.entry(sender_id).or_default().push(id);
        }
    }

    let updated = tx.execute(
        &format!("UPDATE messages SET status = 'read', read_at = ?1 WHERE {}", filter),
        params.as_slice(),
    )?;
    tx.commit()?;

    Ok(ReadOutcome { updated, by_sender })
}

// --- Retention ---

/// Soft-delete every live message created before `cutoff`. One bulk update.
pub fn soft_delete_older_than(
    db: &DbPool,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> ChatResult<usize> {
    let conn = db.lock()?;
    let deleted = conn.execute(
        "UPDATE messages SET is_deleted = 1, deleted_at = ?1
         WHERE is_deleted = 0 AND created_at < ?2",
        rusqlite::params![format_ts(&now), format_ts(&cutoff)],
    )?;
    Ok(deleted)
}

/// How many live messages the next sweep with this cutoff would soft-delete.
pub fn count_expired(db: &DbPool, cutoff: DateTime<Utc>) -> ChatResult<i64> {
    let conn = db.lock()?;
    let count = conn.query_row(
        "SELECT COUNT(*) FROM messages WHERE is_deleted = 0 AND created_at < ?1",
        rusqlite::params![format_ts(&cutoff)],
        |row| row.get(0),
    )?;
    Ok(count)
}

// --- Statistics ---

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatistics {
    pub total_messages: i64,
    pub unread_messages: i64,
    pub today_messages: i64,
    pub total_conversations: i64,
    pub messages_from_users: i64,
    pub messages_from_admins: i64,
}

/// Totals over live messages. `unread_messages` is scoped to `admin_id`.
pub fn statistics(
    db: &DbPool,
    admin_id: &str,
    since: DateTime<Utc>,
) -> ChatResult<ChatStatistics> {
    let conn = db.lock()?;
    let stats = conn.query_row(
        &format!(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN receiver_id = ?1 AND is_from_user = 1
                                           AND status IN ({})
                                      THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN created_at >= ?2 THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT conversation_id),
                    COALESCE(SUM(is_from_user), 0),
                    COALESCE(SUM(is_from_admin), 0)
             FROM messages
             WHERE is_deleted = 0",
            unread_status_list()
        ),
        rusqlite::params![admin_id, format_ts(&since)],
        |row| {
            Ok(ChatStatistics {
                total_messages: row.get(0)?,
                unread_messages: row.get(1)?,
                today_messages: row.get(2)?,
                total_conversations: row.get(3)?,
                messages_from_users: row.get(4)?,
                messages_from_admins: row.get(5)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::Duration;

    fn identity(id: &str, role: Role) -> Identity {
        Identity {
            id: id.to_string(),
            role,
            name: format!("{} name", id),
            email: format!("{}@example.com", id),
        }
    }

    fn seed(db: &DbPool) -> (Identity, Identity, Identity) {
        let admin = identity("admin-1", Role::Admin);
        let alice = identity("alice", Role::User);
        let bob = identity("bob", Role::User);
        for who in [&admin, &alice, &bob] {
            upsert_identity(db, who).unwrap();
        }
        (admin, alice, bob)
    }

    fn send(db: &DbPool, from: &Identity, to: &str, content: &str) -> Message {
        let msg = Message::compose(
            from,
            to,
            content.to_string(),
            MessageKind::Text,
            vec![],
            MessageMetadata::default(),
        );
        insert_message(db, &msg).unwrap();
        msg
    }

    fn send_at(db: &DbPool, from: &Identity, to: &str, created_at: DateTime<Utc>) -> Message {
        let mut msg = Message::compose(
            from,
            to,
            "aged".to_string(),
            MessageKind::Text,
            vec![],
            MessageMetadata::default(),
        );
        msg.created_at = created_at;
        insert_message(db, &msg).unwrap();
        msg
    }

    /// Read a message regardless of soft-deletion, for audit assertions.
    fn load(db: &DbPool, id: &str) -> Message {
        let conn = db.lock().unwrap();
        conn.query_row(
            &format!("SELECT {}, NULL FROM messages m WHERE m.id = ?1", MESSAGE_COLUMNS),
            rusqlite::params![id],
            message_from_row,
        )
        .unwrap()
    }

    #[test]
    fn test_conversation_id_is_commutative() {
        let pairs = [("a", "b"), ("user-9", "admin-1"), ("x", "x"), ("", "z")];
        for (a, b) in pairs {
            assert_eq!(compute_conversation_id(a, b), compute_conversation_id(b, a));
        }
        assert_eq!(compute_conversation_id("zed", "amy"), "amy_zed");
    }

    #[test]
    fn test_resolve_support_account() {
        let db = open_in_memory();
        assert!(resolve_support_account(&db, None).unwrap().is_none());

        let (admin, _, _) = seed(&db);
        let resolved = resolve_support_account(&db, None).unwrap().unwrap();
        assert_eq!(resolved.id, admin.id);

        let by_email = resolve_support_account(&db, Some("ADMIN-1@example.com"))
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, admin.id);

        // A user's email never resolves to the support account
        assert!(resolve_support_account(&db, Some("alice@example.com"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_get_conversation_returns_oldest_first_within_limit() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        send(&db, &alice, &admin.id, "one");
        send(&db, &admin, &alice.id, "two");
        send(&db, &bob, &admin.id, "other thread");
        send(&db, &alice, &admin.id, "three");

        let thread = get_conversation(&db, &admin.id, &alice.id, 2).unwrap();
        let contents: Vec<_> = thread.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
        assert_eq!(thread[1].sender_name.as_deref(), Some("alice name"));

        let full = get_conversation(&db, &alice.id, &admin.id, 50).unwrap();
        assert_eq!(full.len(), 3);
    }

    #[test]
    fn test_unread_count_ignores_read_deleted_and_admin_authored() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        let first = send(&db, &alice, &admin.id, "a");
        send(&db, &bob, &admin.id, "b");
        send(&db, &admin, &alice.id, "reply");
        let aged = send_at(&db, &bob, &admin.id, Utc::now() - Duration::hours(20));

        assert_eq!(get_unread_count_for_admin(&db, &admin.id).unwrap(), 3);

        mark_read(&db, &admin.id, &[first.id.clone()], Utc::now()).unwrap();
        assert_eq!(get_unread_count_for_admin(&db, &admin.id).unwrap(), 2);

        soft_delete_older_than(&db, Utc::now() - Duration::hours(12), Utc::now()).unwrap();
        assert!(load(&db, &aged.id).is_deleted);
        assert_eq!(get_unread_count_for_admin(&db, &admin.id).unwrap(), 1);
    }

    #[test]
    fn test_mark_read_only_touches_own_messages() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        let ids: Vec<String> = (0..3)
            .map(|i| send(&db, &alice, &admin.id, &format!("m{}", i)).id)
            .collect();
        let foreign = send(&db, &admin, &bob.id, "to bob");

        let mut request = ids.clone();
        request.push(foreign.id.clone());
        let outcome = mark_read(&db, &admin.id, &request, Utc::now()).unwrap();

        assert_eq!(outcome.updated, 3);
        assert_eq!(outcome.by_sender.len(), 1);
        assert_eq!(outcome.by_sender[&alice.id], ids);
        for id in &ids {
            let msg = load(&db, id);
            assert_eq!(msg.status, MessageStatus::Read);
            assert!(msg.read_at.is_some());
        }
        let untouched = load(&db, &foreign.id);
        assert_eq!(untouched.status, MessageStatus::Sent);
        assert!(untouched.read_at.is_none());
    }

    #[test]
    fn test_mark_read_groups_flipped_ids_by_sender() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        let a1 = send(&db, &alice, &admin.id, "a1");
        let b1 = send(&db, &bob, &admin.id, "b1");
        let a2 = send(&db, &alice, &admin.id, "a2");

        let request = vec![a1.id.clone(), b1.id.clone(), a2.id.clone()];
        let outcome = mark_read(&db, &admin.id, &request, Utc::now()).unwrap();

        assert_eq!(outcome.updated, 3);
        assert_eq!(outcome.by_sender[&alice.id], vec![a1.id, a2.id]);
        assert_eq!(outcome.by_sender[&bob.id], vec![b1.id]);
    }

    #[test]
    fn test_mark_read_leaves_failed_messages_alone() {
        let db = open_in_memory();
        let (admin, alice, _) = seed(&db);
        let mut failed = Message::compose(
            &alice,
            &admin.id,
            "never arrived".into(),
            MessageKind::Text,
            vec![],
            MessageMetadata::default(),
        );
        failed.status = MessageStatus::Failed;
        insert_message(&db, &failed).unwrap();

        let outcome = mark_read(&db, &admin.id, &[failed.id.clone()], Utc::now()).unwrap();
        assert_eq!(outcome.updated, 0);
        assert!(outcome.by_sender.is_empty());
        let stored = load(&db, &failed.id);
        assert_eq!(stored.status, MessageStatus::Failed);
        assert!(stored.read_at.is_none());
        assert_eq!(get_unread_count_for_admin(&db, &admin.id).unwrap(), 0);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let db = open_in_memory();
        let (admin, alice, _) = seed(&db);
        let msg = send(&db, &alice, &admin.id, "hello");

        let first_at = Utc::now() - Duration::minutes(5);
        mark_read(&db, &admin.id, &[msg.id.clone()], first_at).unwrap();
        let after_first = load(&db, &msg.id);

        let second = mark_read(&db, &admin.id, &[msg.id.clone()], Utc::now()).unwrap();
        let after_second = load(&db, &msg.id);

        assert_eq!(second.updated, 0);
        assert_eq!(after_second.status, MessageStatus::Read);
        assert_eq!(after_first.read_at, after_second.read_at);
    }

    #[test]
    fn test_recent_conversations_groups_and_counts() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        send(&db, &alice, &admin.id, "a1");
        send(&db, &alice, &admin.id, "a2");
        send(&db, &bob, &admin.id, "b1");
        send(&db, &admin, &alice.id, "reply to alice");

        let inbox = get_recent_conversations_for_admin(&db, &admin.id, 10).unwrap();
        assert_eq!(inbox.len(), 2);

        // Alice's thread has the most recent message, so it comes first
        assert_eq!(inbox[0].user.id, alice.id);
        assert_eq!(inbox[0].user.name.as_deref(), Some("alice name"));
        assert_eq!(inbox[0].total_messages, 3);
        assert_eq!(inbox[0].unread_count, 2);
        assert_eq!(inbox[0].last_message.message.content, "reply to alice");

        assert_eq!(inbox[1].user.id, bob.id);
        assert_eq!(inbox[1].total_messages, 1);
        assert_eq!(inbox[1].unread_count, 1);

        let capped = get_recent_conversations_for_admin(&db, &admin.id, 1).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].user.id, alice.id);
    }

    #[test]
    fn test_recent_conversations_include_replies_from_other_admins() {
        let db = open_in_memory();
        let (support, alice, _) = seed(&db);
        let colleague = identity("admin-2", Role::Admin);
        upsert_identity(&db, &colleague).unwrap();

        send(&db, &alice, &support.id, "question");
        let reply = Message::compose(
            &colleague,
            &alice.id,
            "answer".into(),
            MessageKind::Text,
            vec![],
            MessageMetadata::default(),
        )
        .in_conversation(compute_conversation_id(&alice.id, &support.id));
        insert_message(&db, &reply).unwrap();

        for admin_id in [&support.id, &colleague.id] {
            let inbox = get_recent_conversations_for_admin(&db, admin_id, 10).unwrap();
            assert_eq!(inbox.len(), 1);
            assert_eq!(inbox[0].user.id, alice.id);
            assert_eq!(inbox[0].total_messages, 2);
            assert_eq!(inbox[0].last_message.message.content, "answer");
            assert_eq!(inbox[0].last_message.sender_name.as_deref(), Some("admin-2 name"));
        }

        let thread = get_conversation(&db, &alice.id, &support.id, 50).unwrap();
        let contents: Vec<_> = thread.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, vec!["question", "answer"]);
    }

    #[test]
    fn test_recent_conversations_skip_deleted_messages() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        send_at(&db, &bob, &admin.id, Utc::now() - Duration::hours(13));
        send(&db, &alice, &admin.id, "fresh");
        // Newest message in alice's thread, but old enough to be swept
        let mut stale = Message::compose(
            &admin,
            &alice.id,
            "stale reply".into(),
            MessageKind::Text,
            vec![],
            MessageMetadata::default(),
        );
        stale.created_at = Utc::now() - Duration::hours(30);
        insert_message(&db, &stale).unwrap();

        soft_delete_older_than(&db, Utc::now() - Duration::hours(12), Utc::now()).unwrap();

        let inbox = get_recent_conversations_for_admin(&db, &admin.id, 10).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].user.id, alice.id);
        assert_eq!(inbox[0].last_message.message.content, "fresh");
        assert_eq!(inbox[0].total_messages, 1);
        assert!(!inbox[0].last_message.message.is_deleted);
    }

    #[test]
    fn test_soft_delete_only_touches_aged_messages() {
        let db = open_in_memory();
        let (admin, alice, _) = seed(&db);
        let now = Utc::now();
        let old = send_at(&db, &alice, &admin.id, now - Duration::hours(13));
        let recent = send_at(&db, &alice, &admin.id, now - Duration::hours(1));

        let cutoff = now - Duration::hours(12);
        assert_eq!(count_expired(&db, cutoff).unwrap(), 1);
        assert_eq!(soft_delete_older_than(&db, cutoff, now).unwrap(), 1);

        let old = load(&db, &old.id);
        assert!(old.is_deleted);
        assert!(old.deleted_at.is_some());
        assert!(!load(&db, &recent.id).is_deleted);

        // Second pass finds nothing new
        assert_eq!(soft_delete_older_than(&db, cutoff, now).unwrap(), 0);
        assert_eq!(count_expired(&db, cutoff).unwrap(), 0);
    }

    #[test]
    fn test_statistics() {
        let db = open_in_memory();
        let (admin, alice, bob) = seed(&db);
        send(&db, &alice, &admin.id, "a");
        send(&db, &bob, &admin.id, "b");
        send(&db, &admin, &alice.id, "c");
        send_at(&db, &alice, &admin.id, Utc::now() - Duration::days(2));

        let stats = statistics(&db, &admin.id, Utc::now() - Duration::hours(1)).unwrap();
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.unread_messages, 3);
        assert_eq!(stats.today_messages, 3);
        assert_eq!(stats.total_conversations, 2);
        assert_eq!(stats.messages_from_users, 3);
        assert_eq!(stats.messages_from_admins, 1);
    }

    #[test]
    fn test_attachments_and_metadata_persist() {
        let db = open_in_memory();
        let (admin, alice, _) = seed(&db);
        let msg = Message::compose(
            &alice,
            &admin.id,
            "see attached".into(),
            MessageKind::File,
            vec![Attachment {
                url: "https://cdn.example.com/a.pdf".into(),
                name: "a.pdf".into(),
                mime_type: Some("application/pdf".into()),
                size: Some(2048),
            }],
            MessageMetadata {
                ip_address: Some("10.0.0.1".into()),
                user_agent: Some("Mozilla/5.0".into()),
                device_info: Some("desktop".into()),
            },
        );
        insert_message(&db, &msg).unwrap();

        let stored = load(&db, &msg.id);
        assert_eq!(stored.kind, MessageKind::File);
        assert_eq!(stored.attachments, msg.attachments);
        assert_eq!(stored.metadata, msg.metadata);
        assert!(stored.is_from_user());
    }
}
