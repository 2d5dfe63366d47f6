use std::sync::Arc;

use crate::chat::retention::RetentionSweeper;
use crate::config::ChatConfig;
use crate::db::DbPool;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
/// Constructed once at startup; the registry and sweeper live as long as it does.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT verification secret (256-bit key shared with the identity service)
    pub jwt_secret: Vec<u8>,
    /// Live WebSocket connections, partitioned into users and admins
    pub connections: Arc<ConnectionRegistry>,
    /// Chat routing settings
    pub chat: Arc<ChatConfig>,
    /// Background retention sweep, also triggered manually by admins
    pub sweeper: Arc<RetentionSweeper>,
}

/// In-memory state for unit tests: migrated SQLite, empty registry.
#[cfg(test)]
pub(crate) fn test_state(chat: ChatConfig) -> AppState {
    let db = crate::db::open_in_memory();
    let sweeper = RetentionSweeper::new(db.clone(), &crate::config::RetentionConfig::default());
    AppState {
        db,
        jwt_secret: vec![9u8; 32],
        connections: Arc::new(ConnectionRegistry::new()),
        chat: Arc::new(chat),
        sweeper: Arc::new(sweeper),
    }
}
