pub mod migrations;
pub mod models;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Type alias for the shared database connection.
/// rusqlite is synchronous; we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    // Ensure data directory exists
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("chatosi.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    prepare(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Enforce foreign keys and bring the schema up to date.
fn prepare(conn: &mut Connection) -> Result<(), Box<dyn std::error::Error>> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    migrations::migrations().to_latest(conn)?;
    Ok(())
}

/// Fresh in-memory database with the full schema, for unit tests.
#[cfg(test)]
pub fn memory_db() -> DbPool {
    let mut conn = Connection::open_in_memory().expect("open in-memory db");
    prepare(&mut conn).expect("migrate in-memory db");
    Arc::new(Mutex::new(conn))
}

/// Insert a bare user row (unit-test fixture).
#[cfg(test)]
pub fn insert_test_user(db: &DbPool, id: &str) {
    let conn = db.lock().unwrap();
    conn.execute(
        "INSERT INTO users (id, email, full_name, password_hash, profile_pic, created_at, updated_at)
         VALUES (?1, ?2, ?1, 'x', NULL, datetime('now'), datetime('now'))",
        rusqlite::params![id, format!("{}@test.local", id)],
    )
    .unwrap();
}
