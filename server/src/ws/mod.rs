pub mod actor;
pub mod handler;
pub mod protocol;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::chat::events::ServerEvent;
use crate::db::models::Role;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<Message>;

/// A live, authenticated connection. Held only in memory.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Distinguishes reconnects of the same identity.
    pub id: Uuid,
    pub identity_id: String,
    pub sender: ConnectionSender,
}

impl ConnectionHandle {
    pub fn new(identity_id: &str, sender: ConnectionSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id: identity_id.to_string(),
            sender,
        }
    }

    /// Fire-and-forget push. A closed channel means the peer is gone, which
    /// is a normal state for fan-out.
    pub fn push(&self, event: &ServerEvent) {
        if let Some(frame) = event.to_frame() {
            let _ = self.sender.send(frame);
        }
    }
}

/// Connection registry: identity -> live channel, partitioned by role.
///
/// Users are addressable one at a time; admins form a broadcast group. Each
/// map is sharded internally, so register/unregister are atomic per key and
/// a directed send never scans the other partition.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: DashMap<String, ConnectionHandle>,
    admins: DashMap<String, ConnectionHandle>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, role: Role) -> &DashMap<String, ConnectionHandle> {
        match role {
            Role::User => &self.users,
            Role::Admin => &self.admins,
        }
    }

    /// Register a connection after a successful handshake. A second
    /// registration for the same identity replaces the previous channel.
    pub fn register(&self, role: Role, handle: ConnectionHandle) {
        let identity_id = handle.identity_id.clone();
        let replaced = self.group(role).insert(identity_id.clone(), handle);
        tracing::debug!(
            user_id = %identity_id,
            role = role.as_str(),
            replaced = replaced.is_some(),
            "Connection registered"
        );
    }

    /// Remove the entry for `identity_id`, but only while it still belongs to
    /// connection `connection_id`. A late disconnect of a replaced channel
    /// must not evict the reconnect that superseded it.
    pub fn unregister(&self, identity_id: &str, role: Role, connection_id: Uuid) -> bool {
        let removed = self
            .group(role)
            .remove_if(identity_id, |_, handle| handle.id == connection_id)
            .is_some();
        tracing::debug!(
            user_id = %identity_id,
            role = role.as_str(),
            removed,
            "Connection unregistered"
        );
        removed
    }

    pub fn lookup_user(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.users.get(user_id).map(|entry| entry.value().clone())
    }

    pub fn all_admins(&self) -> Vec<ConnectionHandle> {
        self.admins.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Directed push to one identity of the given role. Returns false when
    /// it is offline; the message stays durable and shows up on next fetch.
    pub fn send_to(&self, role: Role, identity_id: &str, event: &ServerEvent) -> bool {
        match self.group(role).get(identity_id) {
            Some(handle) => {
                handle.push(event);
                true
            }
            None => false,
        }
    }

    /// Publish to the admin group. Returns the number of recipients.
    pub fn publish_to_admins(&self, event: &ServerEvent) -> usize {
        publish(&self.admins, event)
    }

    /// Publish to every connected user. Returns the number of recipients.
    pub fn publish_to_users(&self, event: &ServerEvent) -> usize {
        publish(&self.users, event)
    }

    pub fn online_users(&self) -> usize {
        self.users.len()
    }

    pub fn online_admins(&self) -> usize {
        self.admins.len()
    }
}

fn publish(group: &DashMap<String, ConnectionHandle>, event: &ServerEvent) -> usize {
    let Some(frame) = event.to_frame() else {
        return 0;
    };
    let mut delivered = 0;
    for entry in group.iter() {
        if entry.value().sender.send(frame.clone()).is_ok() {
            delivered += 1;
        }
    }
    delivered
}
