pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous, so it sits behind Arc<Mutex> and every
/// operation runs inside tokio::task::spawn_blocking.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("chatdesk.db");
    let mut conn = Connection::open(&db_path)?;

    // WAL lets the retention sweep and live reads overlap
    conn.pragma_update(None, "journal_mode", "WAL")?;

    migrations::migrations().to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Run a store operation on the blocking pool.
pub async fn run_blocking<T, F>(db: &DbPool, op: F) -> crate::error::ChatResult<T>
where
    F: FnOnce(&DbPool) -> crate::error::ChatResult<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || op(&db)).await?
}

/// Fresh migrated in-memory database for unit tests.
#[cfg(test)]
pub fn open_in_memory() -> DbPool {
    let mut conn = Connection::open_in_memory().unwrap();
    migrations::migrations().to_latest(&mut conn).unwrap();
    Arc::new(Mutex::new(conn))
}
