use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking, no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Identities mirrored from the credential issuer

CREATE TABLE identities (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    display_name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('user', 'admin')),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX idx_identities_email ON identities(email);
CREATE INDEX idx_identities_role ON identities(role, created_at);
",
        ),
        M::up(
            "-- Migration 2: Support chat messages

CREATE TABLE messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    content TEXT NOT NULL,
    message_type TEXT NOT NULL DEFAULT 'text'
        CHECK (message_type IN ('text', 'image', 'file', 'system')),
    status TEXT NOT NULL DEFAULT 'sent'
        CHECK (status IN ('sent', 'delivered', 'read', 'failed')),
    conversation_id TEXT NOT NULL,
    is_from_admin INTEGER NOT NULL,
    is_from_user INTEGER NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    device_info TEXT,
    attachments TEXT NOT NULL DEFAULT '[]',
    read_at TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    CHECK (is_from_admin + is_from_user = 1),
    CHECK ((status = 'read') = (read_at IS NOT NULL))
);

CREATE INDEX idx_messages_conversation ON messages(conversation_id, seq);
CREATE INDEX idx_messages_receiver ON messages(receiver_id, is_deleted, status);
CREATE INDEX idx_messages_sender ON messages(sender_id, is_deleted);
CREATE INDEX idx_messages_retention ON messages(is_deleted, created_at);
",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }
}
