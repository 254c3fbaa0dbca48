//! SQLite connection setup.
//!
//! The schema lives in `migrations/` and is compiled into the binary;
//! `rusqlite_migration` records progress in the `user_version` pragma, so
//! reopening an existing graph only applies what is new.

use rusqlite::Connection;
use rusqlite_migration::{Migrations, M};

use crate::error::StorageError;

fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(include_str!("migrations/001_initial_schema.sql"))])
}

/// Opens the graph database at `path`, creating and migrating it as needed.
pub fn open_database(path: &str) -> Result<Connection, StorageError> {
    let conn = prepare(Connection::open(path)?)?;
    tracing::debug!(path, "opened preference graph database");
    Ok(conn)
}

/// A private in-memory graph database, used by tests and parity checks.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(mut conn: Connection) -> Result<Connection, StorageError> {
    // In-memory databases ignore the WAL request.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Edge endpoints reference nodes; SQLite only checks that when asked.
    conn.pragma_update(None, "foreign_keys", "ON")?;

    migrations()
        .to_latest(&mut conn)
        .map_err(|e| StorageError::Migration(e.to_string()))?;
    Ok(conn)
}
